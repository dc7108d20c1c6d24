//! Printing a rendered page to the terminal.

use std::path::PathBuf;

use anyhow::Result;
use attendance_core::auth::LOGIN_PAGE;
use attendance_core::views::Page;

/// Tags that end a line of text
const BLOCK_TAGS: &[&str] = &[
    "br", "div", "p", "li", "tr", "h1", "h2", "h3", "h4", "table", "ul", "section",
];

/// Tags that separate words
const CELL_TAGS: &[&str] = &["td", "th", "span", "option", "button", "strong", "input"];

pub struct Output {
    pub html: bool,
    pub out_dir: PathBuf,
}

impl Output {
    /// Containers to stdout, messages to stderr, downloads into `out_dir`.
    pub fn flush(&self, page: &Page) -> Result<()> {
        for (name, html) in page.containers() {
            if self.html {
                println!("<!-- {} -->\n{}", name, html);
                continue;
            }
            let text = to_text(html);
            if !text.is_empty() {
                println!("[{}]\n{}\n", name, text);
            }
        }
        for alert in &page.alerts {
            eprintln!("{}", alert);
        }
        for location in &page.redirects {
            if location == LOGIN_PAGE {
                eprintln!("Session expired. Run `attendance login` to sign in again.");
            } else {
                eprintln!("-> {}", location);
            }
        }
        for file in &page.downloads {
            let path = file.save_to(&self.out_dir)?;
            eprintln!("Saved {} ({} rows)", path.display(), file.record_count());
        }
        Ok(())
    }
}

/// Plain text from an HTML fragment: tags dropped, entities decoded, one
/// block per line.
pub fn to_text(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(open) = rest.find('<') {
        text.push_str(&rest[..open]);
        let Some(close) = rest[open..].find('>') else {
            rest = &rest[open..];
            break;
        };
        let tag = &rest[open + 1..open + close];
        let name = tag
            .trim_start_matches('/')
            .split(|c: char| c.is_whitespace() || c == '/')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        if BLOCK_TAGS.contains(&name.as_str()) {
            text.push('\n');
        } else if CELL_TAGS.contains(&name.as_str()) {
            text.push(' ');
        }
        rest = &rest[open + close + 1..];
    }
    text.push_str(rest);

    unescape(&text)
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&amp;", "&")
}
