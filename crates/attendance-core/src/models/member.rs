use serde::{Deserialize, Serialize};

use super::{de, ValidationError};

pub const MIN_PASSWORD_LEN: usize = 8;

/// Account role. Anything the backend invents is kept as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    #[default]
    Member,
    Staff,
    Admin,
    SuperAdmin,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Member => "member",
            Role::Staff => "staff",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
            Role::Other(other) => other,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Role::Member => "Member",
            Role::Staff => "Staff",
            Role::Admin => "Admin",
            Role::SuperAdmin => "Super admin",
            Role::Other(other) => other,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Staff | Role::Admin | Role::SuperAdmin)
    }

    pub fn is_super_admin(&self) -> bool {
        matches!(self, Role::SuperAdmin)
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.as_str() {
            "member" => Role::Member,
            "staff" => Role::Staff,
            "admin" => Role::Admin,
            "super_admin" => Role::SuperAdmin,
            _ => Role::Other(value),
        }
    }
}

impl From<&str> for Role {
    fn from(value: &str) -> Self {
        Role::from(value.to_string())
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Member {
    #[serde(default, deserialize_with = "de::text")]
    pub id: String,
    #[serde(default, deserialize_with = "de::text")]
    pub name: String,
    pub kana: Option<String>,
    #[serde(default, deserialize_with = "de::string_or_number")]
    pub login_id: Option<String>,
    pub affiliation: Option<String>,
    pub position: Option<String>,
    pub committee: Option<String>,
    pub company_name: Option<String>,
    pub birthday: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default, deserialize_with = "de::string_or_number")]
    pub student_number: Option<String>,
    pub photo_url: Option<String>,
}

/// Lookup lists used by the member and analytics filters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Masters {
    #[serde(default)]
    pub affiliations: Vec<String>,
    #[serde(default)]
    pub positions: Vec<String>,
    #[serde(default)]
    pub committees: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Add/edit member form.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MemberDraft {
    pub name: String,
    pub kana: String,
    pub login_id: String,
    /// Only sent when filled in; required for new members
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub affiliation: String,
    pub position: String,
    pub committee: String,
    pub company_name: String,
    pub birthday: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

impl MemberDraft {
    pub fn from_member(member: &Member) -> Self {
        Self {
            name: member.name.clone(),
            kana: member.kana.clone().unwrap_or_default(),
            login_id: member.login_id.clone().unwrap_or_default(),
            password: None,
            affiliation: member.affiliation.clone().unwrap_or_default(),
            position: member.position.clone().unwrap_or_default(),
            committee: member.committee.clone().unwrap_or_default(),
            company_name: member.company_name.clone().unwrap_or_default(),
            birthday: member.birthday.clone().unwrap_or_default(),
            role: member.role.clone(),
            photo_url: member.photo_url.clone(),
        }
    }

    pub fn validate(&self, is_new: bool) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::new("Enter a name"));
        }
        if self.login_id.trim().is_empty() {
            return Err(ValidationError::new("Enter a login ID"));
        }
        let has_password = self.password.as_deref().is_some_and(|p| !p.is_empty());
        if is_new && !has_password {
            return Err(ValidationError::new("Enter a password"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileStats {
    #[serde(rename = "totalEvents", default, deserialize_with = "de::amount")]
    pub total_events: i64,
    #[serde(rename = "attendedEvents", default, deserialize_with = "de::amount")]
    pub attended_events: i64,
    #[serde(rename = "totalPaid", default, deserialize_with = "de::amount")]
    pub total_paid: i64,
}

impl ProfileStats {
    pub fn attendance_rate(&self) -> f64 {
        if self.total_events > 0 {
            self.attended_events as f64 / self.total_events as f64 * 100.0
        } else {
            0.0
        }
    }
}

/// The signed-in user as returned by `getUserInfo`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(rename = "memberId", default, deserialize_with = "de::string_or_number")]
    pub member_id: Option<String>,
    #[serde(default, deserialize_with = "de::text")]
    pub name: String,
    #[serde(default, deserialize_with = "de::text")]
    pub email: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default, deserialize_with = "de::string_or_number")]
    pub grade: Option<String>,
    #[serde(rename = "studentNumber", default, deserialize_with = "de::string_or_number")]
    pub student_number: Option<String>,
    pub phone: Option<String>,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
    #[serde(rename = "lineLinked", default, deserialize_with = "de::flag")]
    pub line_linked: bool,
    pub stats: Option<ProfileStats>,
}

/// Editable subset of the profile.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    pub name: String,
    pub email: String,
    pub grade: String,
    #[serde(rename = "studentNumber")]
    pub student_number: String,
    pub phone: String,
}

impl ProfileUpdate {
    pub fn from_profile(profile: &UserProfile) -> Self {
        Self {
            name: profile.name.clone(),
            email: profile.email.clone(),
            grade: profile.grade.clone().unwrap_or_default(),
            student_number: profile.student_number.clone().unwrap_or_default(),
            phone: profile.phone.clone().unwrap_or_default(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() || self.email.trim().is_empty() {
            return Err(ValidationError::new("Name and email are required"));
        }
        Ok(())
    }
}

/// Checks a password change form before it is sent.
pub fn validate_password_change(
    current: &str,
    new: &str,
    confirm: &str,
) -> Result<(), ValidationError> {
    if current.is_empty() || new.is_empty() || confirm.is_empty() {
        return Err(ValidationError::new("Fill in every field"));
    }
    if new != confirm {
        return Err(ValidationError::new("The new passwords do not match"));
    }
    if new.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::new(format!(
            "Passwords must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_rights() {
        assert!(Role::from("staff").is_admin());
        assert!(Role::from("admin").is_admin());
        assert!(Role::from("super_admin").is_super_admin());
        assert!(!Role::from("admin").is_super_admin());
        assert!(!Role::from("member").is_admin());

        let custom = Role::from("auditor");
        assert!(!custom.is_admin());
        assert_eq!(custom.as_str(), "auditor");
    }

    #[test]
    fn test_member_parses_numeric_ids() {
        let member: Member = serde_json::from_str(
            r#"{"id": 3, "name": "Sato", "login_id": 1001, "role": "staff", "student_number": 20240001}"#,
        )
        .unwrap();
        assert_eq!(member.id, "3");
        assert_eq!(member.login_id.as_deref(), Some("1001"));
        assert_eq!(member.role, Role::Staff);
        assert_eq!(member.student_number.as_deref(), Some("20240001"));
    }

    #[test]
    fn test_member_draft_validation() {
        let mut draft = MemberDraft {
            name: "Sato".to_string(),
            login_id: "sato".to_string(),
            ..Default::default()
        };
        assert_eq!(draft.validate(true).unwrap_err().0, "Enter a password");
        assert!(draft.validate(false).is_ok());

        draft.password = Some("secret123".to_string());
        assert!(draft.validate(true).is_ok());

        draft.login_id = "  ".to_string();
        assert_eq!(draft.validate(false).unwrap_err().0, "Enter a login ID");
    }

    #[test]
    fn test_draft_omits_empty_password() {
        let draft = MemberDraft {
            name: "Sato".to_string(),
            login_id: "sato".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&draft).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["role"], "member");
    }

    #[test]
    fn test_password_change_rules() {
        assert!(validate_password_change("", "abcdefgh", "abcdefgh").is_err());
        assert_eq!(
            validate_password_change("old", "abcdefgh", "abcdefgx").unwrap_err().0,
            "The new passwords do not match"
        );
        assert!(validate_password_change("old", "short", "short").is_err());
        assert!(validate_password_change("old", "abcdefgh", "abcdefgh").is_ok());
    }

    #[test]
    fn test_profile_stats_rate() {
        let profile: UserProfile = serde_json::from_str(
            r#"{"name": "Sato", "email": "s@example.com", "role": "member", "stats": {"totalEvents": 8, "attendedEvents": 6, "totalPaid": 3000}}"#,
        )
        .unwrap();
        let stats = profile.stats.unwrap();
        assert_eq!(stats.attendance_rate(), 75.0);
        assert_eq!(stats.total_paid, 3000);
    }
}
