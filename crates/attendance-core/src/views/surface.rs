use std::collections::BTreeMap;

use crate::export::CsvFile;

/// What a page controller draws on.
///
/// Containers are addressed by fixed names and always replaced whole.
pub trait Surface {
    fn render(&mut self, container: &str, html: String);
    /// Blocking message to the user
    fn alert(&mut self, message: &str);
    fn redirect(&mut self, location: &str);
    fn download(&mut self, file: CsvFile);
}

/// In-memory surface. The CLI prints it; tests inspect it.
#[derive(Debug, Default)]
pub struct Page {
    containers: BTreeMap<String, String>,
    order: Vec<String>,
    pub alerts: Vec<String>,
    pub redirects: Vec<String>,
    pub downloads: Vec<CsvFile>,
}

impl Page {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn container(&self, name: &str) -> Option<&str> {
        self.containers.get(name).map(String::as_str)
    }

    /// Containers in the order they were first rendered.
    pub fn containers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.order.iter().filter_map(|name| {
            self.containers
                .get(name)
                .map(|html| (name.as_str(), html.as_str()))
        })
    }

    pub fn last_alert(&self) -> Option<&str> {
        self.alerts.last().map(String::as_str)
    }

    pub fn last_redirect(&self) -> Option<&str> {
        self.redirects.last().map(String::as_str)
    }
}

impl Surface for Page {
    fn render(&mut self, container: &str, html: String) {
        if !self.containers.contains_key(container) {
            self.order.push(container.to_string());
        }
        self.containers.insert(container.to_string(), html);
    }

    fn alert(&mut self, message: &str) {
        self.alerts.push(message.to_string());
    }

    fn redirect(&mut self, location: &str) {
        self.redirects.push(location.to_string());
    }

    fn download(&mut self, file: CsvFile) {
        self.downloads.push(file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_replaces_and_keeps_order() {
        let mut page = Page::new();
        page.render("b", "<p>1</p>".to_string());
        page.render("a", "<p>2</p>".to_string());
        page.render("b", "<p>3</p>".to_string());

        assert_eq!(page.container("b"), Some("<p>3</p>"));
        let names: Vec<&str> = page.containers().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
