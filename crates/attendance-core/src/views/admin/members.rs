use anyhow::Result;
use chrono::NaiveDate;
use tracing::{info, warn};

use super::options;
use crate::api::ApiClient;
use crate::export::CsvFile;
use crate::models::{Masters, Member, MemberDraft, Role, ValidationError};
use crate::utils::{cmp_ignore_case, contains_ignore_case, escape_html, format_date};
use crate::views::{local_now, no_data, report_failure, Controller, Surface};

const MAX_PHOTO_BYTES: usize = 5 * 1024 * 1024;
const PHOTO_TYPES: [&str; 3] = ["image/jpeg", "image/jpg", "image/png"];

/// A profile photo picked in the member form, already Base64-encoded.
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub data_base64: String,
    pub file_name: String,
    pub mime_type: String,
    /// Size of the original file
    pub size_bytes: usize,
}

impl PhotoUpload {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.size_bytes > MAX_PHOTO_BYTES {
            return Err(ValidationError::new("Photos must be 5MB or smaller"));
        }
        if !PHOTO_TYPES.contains(&self.mime_type.to_ascii_lowercase().as_str()) {
            return Err(ValidationError::new("Choose a JPEG or PNG image"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemberCounts {
    pub total: usize,
    pub staff: usize,
    pub member: usize,
}

pub enum MembersAction {
    SetRole(Option<Role>),
    SetAffiliation(Option<String>),
    Search(String),
    /// Open the empty form for a new member
    New,
    Edit(String),
    CloseForm,
    Save {
        draft: MemberDraft,
        photo: Option<PhotoUpload>,
    },
    Delete(String),
    /// Grant or revoke staff rights without opening the form
    ChangeRole {
        id: String,
        role: Role,
    },
    Export,
}

enum Editing {
    Closed,
    New,
    Existing(String),
}

pub struct MembersPage {
    api: ApiClient,
    members: Vec<Member>,
    masters: Masters,
    role: Option<Role>,
    affiliation: Option<String>,
    search_query: String,
    editing: Editing,
}

impl MembersPage {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            members: Vec::new(),
            masters: Masters::default(),
            role: None,
            affiliation: None,
            search_query: String::new(),
            editing: Editing::Closed,
        }
    }

    pub fn counts(&self) -> MemberCounts {
        MemberCounts {
            total: self.members.len(),
            staff: self.members.iter().filter(|m| m.role.is_admin()).count(),
            member: self
                .members
                .iter()
                .filter(|m| m.role == Role::Member)
                .count(),
        }
    }

    pub fn get_filtered_members(&self) -> Vec<&Member> {
        let mut filtered: Vec<&Member> = self
            .members
            .iter()
            .filter(|m| self.role.as_ref().map_or(true, |r| &m.role == r))
            .filter(|m| {
                self.affiliation
                    .as_deref()
                    .map_or(true, |a| m.affiliation.as_deref() == Some(a))
            })
            .collect();

        if !self.search_query.is_empty() {
            let query = self.search_query.to_lowercase();
            let matches = |field: &Option<String>| {
                field
                    .as_deref()
                    .is_some_and(|v| contains_ignore_case(v, &query))
            };
            filtered.retain(|m| {
                contains_ignore_case(&m.name, &query)
                    || matches(&m.kana)
                    || matches(&m.login_id)
                    || matches(&m.student_number)
            });
        }

        filtered.sort_by(|a, b| cmp_ignore_case(&a.name, &b.name));
        filtered
    }

    fn member_row(member: &Member) -> String {
        let photo = match member.photo_url.as_deref().filter(|u| !u.is_empty()) {
            Some(url) => format!(
                r#"<img src="{}" alt="{}" class="member-photo-thumb">"#,
                escape_html(url),
                escape_html(&member.name)
            ),
            None => r#"<div class="member-photo-placeholder">👤</div>"#.to_string(),
        };
        let or_dash = |v: &Option<String>| {
            v.as_deref()
                .filter(|v| !v.is_empty())
                .map(escape_html)
                .unwrap_or_else(|| "-".to_string())
        };
        let id = escape_html(&member.id);
        format!(
            r#"<tr class="member-row"><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td><span class="role-badge role-{}">{}</span></td><td>{}</td><td class="actions"><button data-action="edit" data-id="{id}">Edit</button><button class="btn-danger" data-action="delete" data-id="{id}">Delete</button></td></tr>"#,
            photo,
            escape_html(&member.name),
            or_dash(&member.kana),
            or_dash(&member.login_id),
            or_dash(&member.affiliation),
            or_dash(&member.position),
            escape_html(member.role.as_str()),
            escape_html(member.role.label()),
            member
                .birthday
                .as_deref()
                .filter(|b| !b.is_empty())
                .map(format_date)
                .unwrap_or_else(|| "-".to_string()),
            id = id,
        )
    }

    fn render_list(&self, surface: &mut dyn Surface) {
        let members = self.get_filtered_members();
        let html = if members.is_empty() {
            no_data("No members")
        } else {
            members.iter().map(|m| Self::member_row(m)).collect()
        };
        surface.render("membersList", html);

        let counts = self.counts();
        surface.render(
            "memberStats",
            format!(
                r#"<span id="totalMembers">{}</span><span id="adminCount">{}</span><span id="memberCount">{}</span>"#,
                counts.total, counts.staff, counts.member
            ),
        );
    }

    fn render_filters(&self, surface: &mut dyn Surface) {
        surface.render(
            "affiliationFilter",
            options(
                self.masters.affiliations.iter().map(String::as_str),
                self.affiliation.as_deref(),
            ),
        );
    }

    fn select(id: &str, values: &[String], selected: &str) -> String {
        let choices: String = values
            .iter()
            .map(|v| {
                format!(
                    r#"<option value="{0}"{1}>{0}</option>"#,
                    escape_html(v),
                    if v == selected { " selected" } else { "" }
                )
            })
            .collect();
        format!(
            r#"<select id="{}"><option value="">Choose</option>{}</select>"#,
            id, choices
        )
    }

    fn render_form(&self, surface: &mut dyn Surface) {
        let (title, draft) = match &self.editing {
            Editing::Closed => {
                surface.render("memberModal", String::new());
                return;
            }
            Editing::New => ("Add member", MemberDraft::default()),
            Editing::Existing(id) => match self.members.iter().find(|m| &m.id == id) {
                Some(member) => ("Edit member", MemberDraft::from_member(member)),
                None => return,
            },
        };
        let photo = draft
            .photo_url
            .as_deref()
            .map(|u| format!(r#"<img id="photoPreview" src="{}">"#, escape_html(u)))
            .unwrap_or_default();
        surface.render(
            "memberModal",
            format!(
                r#"<h3 id="modalTitle">{}</h3><input id="memberName" value="{}"><input id="memberKana" value="{}"><input id="memberLoginId" value="{}"><input id="memberPassword" type="password" value="">{}{}{}<input id="memberCompany" value="{}"><input id="memberBirthday" type="date" value="{}"><input id="memberRole" value="{}">{}"#,
                title,
                escape_html(&draft.name),
                escape_html(&draft.kana),
                escape_html(&draft.login_id),
                Self::select("memberAffiliation", &self.masters.affiliations, &draft.affiliation),
                Self::select("memberPosition", &self.masters.positions, &draft.position),
                Self::select("memberCommittee", &self.masters.committees, &draft.committee),
                escape_html(&draft.company_name),
                escape_html(&draft.birthday),
                escape_html(draft.role.as_str()),
                photo
            ),
        );
    }

    async fn reload(&mut self, surface: &mut dyn Surface) {
        match self.api.get_members().await {
            Ok(members) => {
                self.members = members;
                self.render_list(surface);
            }
            Err(e) => report_failure(surface, "Failed to load members", &e),
        }
    }

    /// Replace the listed copy with the server's current record before
    /// editing. The listed copy is used if the lookup fails.
    async fn refresh_member(&mut self, id: &str) {
        match self.api.get_member(id).await {
            Ok(fresh) => {
                if let Some(slot) = self.members.iter_mut().find(|m| m.id == id) {
                    *slot = fresh;
                }
            }
            Err(e) => warn!(member_id = id, error = %format!("{:#}", e), "Failed to refresh member"),
        }
    }

    async fn save(&self, draft: MemberDraft, photo: Option<PhotoUpload>) -> Result<()> {
        let mut draft = MemberDraft {
            name: draft.name.trim().to_string(),
            kana: draft.kana.trim().to_string(),
            login_id: draft.login_id.trim().to_string(),
            company_name: draft.company_name.trim().to_string(),
            password: draft.password.filter(|p| !p.is_empty()),
            ..draft
        };
        let existing = match &self.editing {
            Editing::Existing(id) => Some(id.as_str()),
            _ => None,
        };
        draft.validate(existing.is_none())?;

        if let Some(photo) = photo {
            photo.validate()?;
            let url = self
                .api
                .upload_profile_photo(&photo.data_base64, &photo.file_name, &photo.mime_type)
                .await?;
            draft.photo_url = Some(url);
        }

        match existing {
            Some(id) => {
                self.api.update_member(id, &draft).await?;
                info!(member_id = id, "Updated member");
            }
            None => {
                self.api.add_member(&draft).await?;
                info!(login_id = %draft.login_id, "Added member");
            }
        }
        Ok(())
    }

    pub fn export_csv(&self, today: NaiveDate) -> CsvFile {
        let mut csv = CsvFile::new(
            format!("members_{}.csv", today.format("%Y-%m-%d")),
            &[
                "Name",
                "Kana",
                "Login ID",
                "Affiliation",
                "Position",
                "Committee",
                "Company",
                "Birthday",
                "Role",
            ],
        );
        for m in &self.members {
            csv.push_row([
                m.name.clone(),
                m.kana.clone().unwrap_or_default(),
                m.login_id.clone().unwrap_or_default(),
                m.affiliation.clone().unwrap_or_default(),
                m.position.clone().unwrap_or_default(),
                m.committee.clone().unwrap_or_default(),
                m.company_name.clone().unwrap_or_default(),
                m.birthday.clone().unwrap_or_default(),
                m.role.label().to_string(),
            ]);
        }
        csv
    }
}

impl Controller for MembersPage {
    type Action = MembersAction;

    async fn load(&mut self, surface: &mut dyn Surface) {
        let (masters, members) = futures::join!(self.api.get_masters(), self.api.get_members());
        // Without masters the filters are just empty
        match masters {
            Ok(masters) => self.masters = masters,
            Err(e) => warn!(error = %format!("{:#}", e), "Failed to load masters"),
        }
        self.render_filters(surface);
        match members {
            Ok(members) => {
                self.members = members;
                self.render_list(surface);
            }
            Err(e) => report_failure(surface, "Failed to load members", &e),
        }
    }

    async fn dispatch(&mut self, action: MembersAction, surface: &mut dyn Surface) {
        match action {
            MembersAction::SetRole(role) => {
                self.role = role;
                self.render_list(surface);
            }
            MembersAction::SetAffiliation(affiliation) => {
                self.affiliation = affiliation;
                self.render_list(surface);
            }
            MembersAction::Search(query) => {
                self.search_query = query;
                self.render_list(surface);
            }
            MembersAction::New => {
                self.editing = Editing::New;
                self.render_form(surface);
            }
            MembersAction::Edit(id) => {
                if !self.members.iter().any(|m| m.id == id) {
                    return;
                }
                self.refresh_member(&id).await;
                self.editing = Editing::Existing(id);
                self.render_form(surface);
            }
            MembersAction::CloseForm => {
                self.editing = Editing::Closed;
                self.render_form(surface);
            }
            MembersAction::Save { draft, photo } => match self.save(draft, photo).await {
                Ok(()) => {
                    surface.alert(match self.editing {
                        Editing::Existing(_) => "Member updated",
                        _ => "Member added",
                    });
                    self.editing = Editing::Closed;
                    self.render_form(surface);
                    self.reload(surface).await;
                }
                Err(e) => report_failure(surface, "Failed to save the member", &e),
            },
            MembersAction::Delete(id) => {
                if !self.members.iter().any(|m| m.id == id) {
                    return;
                }
                match self.api.delete_member(&id).await {
                    Ok(()) => {
                        info!(member_id = %id, "Deleted member");
                        surface.alert("Member deleted");
                        self.reload(surface).await;
                    }
                    Err(e) => report_failure(surface, "Failed to delete the member", &e),
                }
            }
            MembersAction::ChangeRole { id, role } => {
                let Some(member) = self.members.iter().find(|m| m.id == id) else {
                    return;
                };
                if member.role == role {
                    return;
                }
                let name = member.name.clone();
                match self.api.update_member_role(&id, &role).await {
                    Ok(()) => {
                        info!(member_id = %id, role = role.as_str(), "Changed member role");
                        surface.alert(&format!("{} is now {}", name, role.label()));
                        self.reload(surface).await;
                    }
                    Err(e) => report_failure(surface, "Failed to change the role", &e),
                }
            }
            MembersAction::Export => {
                let csv = self.export_csv(local_now().date());
                info!(rows = csv.record_count(), file = %csv.filename, "Exported members");
                surface.download(csv);
                surface.alert("Member list exported");
            }
        }
    }
}
