use anyhow::Result;
use tracing::info;

use crate::api::ApiClient;
use crate::models::{validate_password_change, ProfileUpdate, UserProfile};
use crate::utils::{escape_html, format_currency};
use crate::views::{report_failure, Controller, Surface};

pub enum ProfileAction {
    ToggleEdit,
    Save(ProfileUpdate),
    ChangePassword {
        current: String,
        new: String,
        confirm: String,
    },
}

pub struct ProfilePage {
    api: ApiClient,
    user: Option<UserProfile>,
    editing: bool,
}

fn or_unset(value: Option<&str>) -> String {
    match value.filter(|v| !v.is_empty()) {
        Some(v) => escape_html(v),
        None => "Not set".to_string(),
    }
}

impl ProfilePage {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            user: None,
            editing: false,
        }
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    fn render(&self, surface: &mut dyn Surface) {
        let Some(user) = &self.user else {
            return;
        };
        let line = if user.line_linked {
            r#"<span class="status-badge status-confirmed">Linked</span>"#
        } else {
            r#"<span class="status-badge status-pending">Not linked</span>"#
        };
        surface.render(
            "profileView",
            format!(
                r#"<div class="profile-row"><span class="label">Name</span><span id="userName">{}</span></div><div class="profile-row"><span class="label">Email</span><span id="userEmail">{}</span></div><div class="profile-row"><span class="label">Role</span><span id="userRole">{}</span></div><div class="profile-row"><span class="label">Grade</span><span id="userGrade">{}</span></div><div class="profile-row"><span class="label">Student number</span><span id="userStudent">{}</span></div><div class="profile-row"><span class="label">LINE</span>{}</div>"#,
                escape_html(&user.name),
                escape_html(&user.email),
                user.role.label(),
                or_unset(user.grade.as_deref()),
                or_unset(user.student_number.as_deref()),
                line
            ),
        );

        let form = ProfileUpdate::from_profile(user);
        surface.render(
            "profileEdit",
            if self.editing {
                format!(
                    r#"<form id="editMode"><input id="editName" value="{}"><input id="editEmail" value="{}"><input id="editGrade" value="{}"><input id="editStudentNumber" value="{}"><input id="editPhone" value="{}"></form>"#,
                    escape_html(&form.name),
                    escape_html(&form.email),
                    escape_html(&form.grade),
                    escape_html(&form.student_number),
                    escape_html(&form.phone)
                )
            } else {
                String::new()
            },
        );

        let stats = user
            .stats
            .as_ref()
            .map(|s| {
                format!(
                    r#"<div class="stat"><span id="totalEvents">{}</span> events</div><div class="stat"><span id="attendedEvents">{}</span> attended</div><div class="stat"><span id="attendanceRate">{:.1}</span>%</div><div class="stat">Paid <span id="totalPaid">{}</span></div>"#,
                    s.total_events,
                    s.attended_events,
                    s.attendance_rate(),
                    format_currency(s.total_paid)
                )
            })
            .unwrap_or_default();
        surface.render("profileStats", stats);
    }

    async fn reload(&mut self, surface: &mut dyn Surface) {
        match self.api.get_user_info().await {
            Ok(user) => {
                self.user = Some(user);
                self.render(surface);
            }
            Err(e) => report_failure(surface, "Failed to load your profile", &e),
        }
    }

    async fn save(&self, update: ProfileUpdate) -> Result<()> {
        let update = ProfileUpdate {
            name: update.name.trim().to_string(),
            email: update.email.trim().to_string(),
            grade: update.grade.trim().to_string(),
            student_number: update.student_number.trim().to_string(),
            phone: update.phone.trim().to_string(),
        };
        update.validate()?;
        self.api.update_profile(&update).await?;
        info!("Profile updated");
        Ok(())
    }

    async fn change_password(&self, current: &str, new: &str, confirm: &str) -> Result<()> {
        validate_password_change(current, new, confirm)?;
        self.api.change_password(current, new).await?;
        info!("Password changed");
        Ok(())
    }
}

impl Controller for ProfilePage {
    type Action = ProfileAction;

    async fn load(&mut self, surface: &mut dyn Surface) {
        self.reload(surface).await;
    }

    async fn dispatch(&mut self, action: ProfileAction, surface: &mut dyn Surface) {
        match action {
            ProfileAction::ToggleEdit => {
                self.editing = !self.editing;
                self.render(surface);
            }
            ProfileAction::Save(update) => match self.save(update).await {
                Ok(()) => {
                    surface.alert("Profile updated");
                    self.editing = false;
                    self.reload(surface).await;
                }
                Err(e) => report_failure(surface, "Failed to update your profile", &e),
            },
            ProfileAction::ChangePassword {
                current,
                new,
                confirm,
            } => match self.change_password(&current, &new, &confirm).await {
                Ok(()) => surface.alert("Password changed"),
                Err(e) => report_failure(surface, "Failed to change the password", &e),
            },
        }
    }
}
