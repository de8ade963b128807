//! The remote CRM's representation of a person.
//!
//! Only the fields the connector reconciles are typed. Everything else the
//! API returns is kept in `extra` and never acted on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::member::Address;

/// Remote person ids are integers.
pub type PersonId = u64;

/// The remote `home_address` structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeAddress {
  #[serde(default)]
  pub address1:     Option<String>,
  #[serde(default)]
  pub address2:     Option<String>,
  #[serde(default)]
  pub city:         Option<String>,
  #[serde(default)]
  pub state:        Option<String>,
  #[serde(default)]
  pub zip:          Option<String>,
  #[serde(default)]
  pub country_code: Option<String>,
}

impl HomeAddress {
  /// Blank parts become `None`; an address with no parts at all becomes
  /// `None`.
  pub fn normalized(self) -> Option<Self> {
    let addr = Self {
      address1:     blank_to_none(self.address1),
      address2:     blank_to_none(self.address2),
      city:         blank_to_none(self.city),
      state:        blank_to_none(self.state),
      zip:          blank_to_none(self.zip),
      country_code: blank_to_none(self.country_code),
    };
    (addr != Self::default()).then_some(addr)
  }
}

impl From<Address> for HomeAddress {
  fn from(a: Address) -> Self {
    Self {
      address1:     a.line1,
      address2:     a.line2,
      city:         a.town,
      state:        a.state,
      zip:          a.postcode,
      country_code: a.country,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemotePerson {
  pub id:            PersonId,
  /// The only clock the remote side has; it covers every field.
  #[serde(default)]
  pub updated_at:    Option<DateTime<Utc>>,
  #[serde(default)]
  pub prefix:        Option<String>,
  #[serde(default)]
  pub first_name:    Option<String>,
  #[serde(default)]
  pub middle_name:   Option<String>,
  #[serde(default)]
  pub last_name:     Option<String>,
  #[serde(default)]
  pub sex:           Option<String>,
  #[serde(default)]
  pub email:         Option<String>,
  #[serde(default)]
  pub mobile:        Option<String>,
  #[serde(default)]
  pub phone:         Option<String>,
  #[serde(default)]
  pub email_opt_in:  Option<bool>,
  #[serde(default)]
  pub mobile_opt_in: Option<bool>,
  #[serde(default)]
  pub do_not_call:   Option<bool>,
  #[serde(default)]
  pub home_address:  Option<HomeAddress>,
  #[serde(flatten)]
  pub extra:         Map<String, Value>,
}

impl RemotePerson {
  /// A person with only an id; handy for tests and for fresh creates.
  pub fn with_id(id: PersonId) -> Self {
    Self {
      id,
      updated_at: None,
      prefix: None,
      first_name: None,
      middle_name: None,
      last_name: None,
      sex: None,
      email: None,
      mobile: None,
      phone: None,
      email_opt_in: None,
      mobile_opt_in: None,
      do_not_call: None,
      home_address: None,
      extra: Map::new(),
    }
  }

  /// Decode the `person` object of an API response.
  pub fn from_value(value: Value) -> serde_json::Result<Self> {
    serde_json::from_value(value)
  }
}

pub(crate) fn blank_to_none(value: Option<String>) -> Option<String> {
  value.filter(|v| !v.trim().is_empty())
}
