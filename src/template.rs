use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

lazy_static! {
    // escaped braces, a {placeholder}, or a brace with no partner
    static ref TOKEN_REGEX: Regex = Regex::new(r"\{\{|\}\}|\{([^{}]*)\}|[{}]").unwrap();
}

/// Letter body pre-filled in the dashboard.
pub const DEFAULT_TEMPLATE: &str = "
Dear {employee_name},

Greetings from {company_name}!

We are reaching out to you regarding your role as {designation}.
Please review the attached document and let us know if you need any further details.

Best regards,
{sender_name}
{company_name}
";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TemplateError {
    #[error("unknown placeholder {{{name}}}; use one of {}", known_placeholders())]
    UnknownPlaceholder { name: String },

    #[error("malformed template at byte {position}: {reason}")]
    Malformed { position: usize, reason: &'static str },
}

/// The closed set of names a template may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    EmployeeName,
    CompanyName,
    Designation,
    SenderName,
}

impl Placeholder {
    pub const ALL: [Placeholder; 4] = [
        Placeholder::EmployeeName,
        Placeholder::CompanyName,
        Placeholder::Designation,
        Placeholder::SenderName,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "employee_name" => Some(Placeholder::EmployeeName),
            "company_name" => Some(Placeholder::CompanyName),
            "designation" => Some(Placeholder::Designation),
            "sender_name" => Some(Placeholder::SenderName),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Placeholder::EmployeeName => "employee_name",
            Placeholder::CompanyName => "company_name",
            Placeholder::Designation => "designation",
            Placeholder::SenderName => "sender_name",
        }
    }
}

fn known_placeholders() -> String {
    Placeholder::ALL
        .iter()
        .map(|p| format!("{{{}}}", p.name()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Per-recipient values substituted into the template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateVariables {
    pub employee_name: String,
    pub company_name: String,
    pub designation: String,
    pub sender_name: String,
}

impl TemplateVariables {
    pub fn get(&self, placeholder: Placeholder) -> &str {
        match placeholder {
            Placeholder::EmployeeName => &self.employee_name,
            Placeholder::CompanyName => &self.company_name,
            Placeholder::Designation => &self.designation,
            Placeholder::SenderName => &self.sender_name,
        }
    }
}

/// Fill `template` with `variables` in a single literal pass.
///
/// `{{` and `}}` produce literal braces. Substituted text is inserted as-is
/// and never scanned again.
pub fn render(template: &str, variables: &TemplateVariables) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for caps in TOKEN_REGEX.captures_iter(template) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&template[last..whole.start()]);
        last = whole.end();

        match whole.as_str() {
            "{{" => out.push('{'),
            "}}" => out.push('}'),
            "{" => {
                return Err(TemplateError::Malformed {
                    position: whole.start(),
                    reason: "unclosed '{'",
                });
            }
            "}" => {
                return Err(TemplateError::Malformed {
                    position: whole.start(),
                    reason: "single '}' encountered",
                });
            }
            _ => {
                let name = caps.get(1).map_or("", |m| m.as_str());
                if name.is_empty() {
                    return Err(TemplateError::Malformed {
                        position: whole.start(),
                        reason: "empty placeholder",
                    });
                }
                let placeholder =
                    Placeholder::from_name(name).ok_or_else(|| TemplateError::UnknownPlaceholder {
                        name: name.to_string(),
                    })?;
                out.push_str(variables.get(placeholder));
            }
        }
    }

    out.push_str(&template[last..]);
    Ok(out)
}

/// Check a template without rendering it for anyone.
pub fn validate(template: &str) -> Result<(), TemplateError> {
    render(template, &TemplateVariables::default()).map(|_| ())
}
