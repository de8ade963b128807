//! Phone number normalisation and mobile/landline classification.
//!
//! Local numbers are stored in international form (e.g. `61468519266`); the
//! remote CRM expects national form with a trunk `0` (`0468519266`). A
//! number is a mobile iff its national form, minus the trunk `0`, starts
//! with the configured mobile destination-code prefix.

use serde::{Deserialize, Serialize};

/// Which remote field a number belongs in: `mobile` or `phone`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhoneKind {
  Mobile,
  Landline,
}

impl PhoneKind {
  /// The remote API field name for numbers of this kind.
  pub fn remote_field(self) -> &'static str {
    match self {
      Self::Mobile => "mobile",
      Self::Landline => "phone",
    }
  }
}

/// Country-specific phone settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneSettings {
  /// Country calling code stored on local numbers, e.g. `"61"`. When unset,
  /// numbers are passed through unchanged.
  #[serde(default)]
  pub default_country_code: Option<String>,
  /// National mobile destination-code prefix, e.g. `"4"`.
  #[serde(default = "default_mobile_prefix")]
  pub mobile_prefix:        String,
}

fn default_mobile_prefix() -> String { "4".to_string() }

impl Default for PhoneSettings {
  fn default() -> Self {
    Self {
      default_country_code: None,
      mobile_prefix:        default_mobile_prefix(),
    }
  }
}

impl PhoneSettings {
  /// Convert a stored number to national form by replacing a leading country
  /// code with the trunk `0`.
  pub fn to_national(&self, number: &str) -> String {
    let digits = normalize_phone(number);
    match self.default_country_code.as_deref() {
      Some(code) if !code.is_empty() => match digits.strip_prefix(code) {
        Some(rest) => format!("0{rest}"),
        None => digits,
      },
      _ => digits,
    }
  }

  pub fn classify(&self, number: &str) -> PhoneKind {
    let national = self.to_national(number);
    let subscriber = strip_trunk_zero(&national);
    if !self.mobile_prefix.is_empty() && subscriber.starts_with(&self.mobile_prefix) {
      PhoneKind::Mobile
    } else {
      PhoneKind::Landline
    }
  }
}

/// Strip a single leading trunk `0`.
pub fn strip_trunk_zero(number: &str) -> &str {
  number.strip_prefix('0').unwrap_or(number)
}

/// Drop whitespace, dashes, dots, parentheses and a leading `+`.
pub fn normalize_phone(s: &str) -> String {
  s.trim()
    .trim_start_matches('+')
    .chars()
    .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '.' | '(' | ')'))
    .collect()
}
