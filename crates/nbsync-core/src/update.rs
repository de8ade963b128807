//! `UpdateSet`: the mutation the reconciler hands to the member-upsert
//! collaborator.
//!
//! Keys use the local vocabulary (`firstname`, `middlenames`, ...). The name
//! family travels as one unit; phones, subscriptions and addresses are
//! append-only lists so that several snapshot attributes feeding the same
//! key never overwrite each other.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::{
  SYSTEM_NAME,
  member::{Address, SubscriptionKind},
  person::{RemotePerson, blank_to_none},
  phone::PhoneKind,
};

// ─── Keys ────────────────────────────────────────────────────────────────────

/// Canonical local attribute keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateKey {
  Firstname,
  Middlenames,
  Lastname,
  Title,
  Gender,
  Email,
  Phones,
  Subscriptions,
  Addresses,
}

impl UpdateKey {
  pub const NAME_FAMILY: [Self; 5] = [
    Self::Firstname,
    Self::Middlenames,
    Self::Lastname,
    Self::Title,
    Self::Gender,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Firstname => "firstname",
      Self::Middlenames => "middlenames",
      Self::Lastname => "lastname",
      Self::Title => "title",
      Self::Gender => "gender",
      Self::Email => "email",
      Self::Phones => "phones",
      Self::Subscriptions => "subscriptions",
      Self::Addresses => "addresses",
    }
  }
}

// ─── Values ──────────────────────────────────────────────────────────────────

/// A new value for a single-valued field: set it, or remove what is there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "lowercase")]
pub enum Change<T> {
  Set(T),
  Clear,
}

impl<T> Change<T> {
  pub fn from_option(value: Option<T>) -> Self {
    match value {
      Some(v) => Self::Set(v),
      None => Self::Clear,
    }
  }

  pub fn as_set(&self) -> Option<&T> {
    match self {
      Self::Set(v) => Some(v),
      Self::Clear => None,
    }
  }
}

/// Every name part, always supplied together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameParts {
  pub title:       Option<String>,
  pub firstname:   Option<String>,
  pub middlenames: Option<String>,
  pub lastname:    Option<String>,
  pub gender:      Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneUpdate {
  pub kind:  PhoneKind,
  pub phone: Change<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionAction {
  Subscribe,
  Unsubscribe,
}

impl SubscriptionAction {
  pub fn from_subscribed(subscribed: bool) -> Self {
    if subscribed { Self::Subscribe } else { Self::Unsubscribe }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Subscribe => "subscribe",
      Self::Unsubscribe => "unsubscribe",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionUpdate {
  pub kind:   SubscriptionKind,
  pub action: SubscriptionAction,
  pub reason: String,
}

impl SubscriptionUpdate {
  pub fn new(kind: SubscriptionKind, action: SubscriptionAction) -> Self {
    Self { kind, action, reason: SYSTEM_NAME.to_string() }
  }

  pub fn slug(&self) -> &'static str { self.kind.slug() }
}

// ─── UpdateSet ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSet {
  pub name:          Option<NameParts>,
  pub email:         Option<Change<String>>,
  pub phones:        Vec<PhoneUpdate>,
  pub subscriptions: Vec<SubscriptionUpdate>,
  pub addresses:     Vec<Change<Address>>,
}

impl UpdateSet {
  pub fn is_empty(&self) -> bool {
    self.name.is_none()
      && self.email.is_none()
      && self.phones.is_empty()
      && self.subscriptions.is_empty()
      && self.addresses.is_empty()
  }

  /// The keys present, in canonical order.
  pub fn keys(&self) -> Vec<UpdateKey> {
    let mut keys = Vec::new();
    if self.name.is_some() {
      keys.extend(UpdateKey::NAME_FAMILY);
    }
    if self.email.is_some() {
      keys.push(UpdateKey::Email);
    }
    if !self.phones.is_empty() {
      keys.push(UpdateKey::Phones);
    }
    if !self.subscriptions.is_empty() {
      keys.push(UpdateKey::Subscriptions);
    }
    if !self.addresses.is_empty() {
      keys.push(UpdateKey::Addresses);
    }
    keys
  }

  /// Render in the flat, key-per-attribute shape the member-upsert
  /// collaborator and the debug log use. Cleared values render as `null`.
  pub fn to_payload(&self) -> Value {
    let mut out = Map::new();
    if let Some(name) = &self.name {
      out.insert(UpdateKey::Firstname.as_str().into(), json!(name.firstname));
      out.insert(UpdateKey::Middlenames.as_str().into(), json!(name.middlenames));
      out.insert(UpdateKey::Lastname.as_str().into(), json!(name.lastname));
      out.insert(UpdateKey::Title.as_str().into(), json!(name.title));
      out.insert(UpdateKey::Gender.as_str().into(), json!(name.gender));
    }
    if let Some(email) = &self.email {
      out.insert(UpdateKey::Email.as_str().into(), json!(email.as_set()));
    }
    if !self.phones.is_empty() {
      let phones: Vec<Value> = self
        .phones
        .iter()
        .map(|p| json!({ "phone": p.phone.as_set() }))
        .collect();
      out.insert(UpdateKey::Phones.as_str().into(), Value::Array(phones));
    }
    if !self.subscriptions.is_empty() {
      let subs: Vec<Value> = self
        .subscriptions
        .iter()
        .map(|s| json!({ "slug": s.slug(), "action": s.action.as_str(), "reason": s.reason }))
        .collect();
      out.insert(UpdateKey::Subscriptions.as_str().into(), Value::Array(subs));
    }
    if !self.addresses.is_empty() {
      let addrs: Vec<Value> = self
        .addresses
        .iter()
        .map(|a| match a {
          Change::Set(a) => json!({
            "line1": a.line1, "line2": a.line2, "town": a.town,
            "state": a.state, "postcode": a.postcode, "country": a.country
          }),
          Change::Clear => Value::Null,
        })
        .collect();
      out.insert(UpdateKey::Addresses.as_str().into(), Value::Array(addrs));
    }
    Value::Object(out)
  }

  /// A last-write import of a remote person: everything present on the
  /// remote side is taken as-is, nothing is cleared.
  pub fn import(person: &RemotePerson) -> Self {
    let text = |v: &Option<String>| blank_to_none(v.clone());
    let name = NameParts {
      title:       text(&person.prefix),
      firstname:   text(&person.first_name),
      middlenames: text(&person.middle_name),
      lastname:    text(&person.last_name),
      gender:      text(&person.sex),
    };

    let mut phones = Vec::new();
    if let Some(mobile) = text(&person.mobile) {
      phones.push(PhoneUpdate { kind: PhoneKind::Mobile, phone: Change::Set(mobile) });
    }
    if let Some(phone) = text(&person.phone) {
      phones.push(PhoneUpdate { kind: PhoneKind::Landline, phone: Change::Set(phone) });
    }

    let addresses = person
      .home_address
      .clone()
      .and_then(|a| a.normalized())
      .map(|a| vec![Change::Set(Address::from(a))])
      .unwrap_or_default();

    Self {
      name: (name != NameParts::default()).then_some(name),
      email: text(&person.email).map(Change::Set),
      phones,
      subscriptions: Vec::new(),
      addresses,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_set_has_no_keys() {
    let u = UpdateSet::default();
    assert!(u.is_empty());
    assert!(u.keys().is_empty());
    assert_eq!(u.to_payload(), json!({}));
  }

  #[test]
  fn payload_uses_local_vocabulary() {
    let u = UpdateSet {
      email: Some(Change::Clear),
      phones: vec![
        PhoneUpdate { kind: PhoneKind::Mobile, phone: Change::Set("0455123456".into()) },
        PhoneUpdate { kind: PhoneKind::Landline, phone: Change::Set("0255551234".into()) },
      ],
      subscriptions: vec![SubscriptionUpdate::new(
        SubscriptionKind::Calling,
        SubscriptionAction::Unsubscribe,
      )],
      ..UpdateSet::default()
    };
    assert_eq!(
      u.to_payload(),
      json!({
        "email": null,
        "phones": [{ "phone": "0455123456" }, { "phone": "0255551234" }],
        "subscriptions": [
          { "slug": "calling", "action": "unsubscribe", "reason": "nation_builder" }
        ],
      })
    );
    assert_eq!(
      u.keys(),
      vec![UpdateKey::Email, UpdateKey::Phones, UpdateKey::Subscriptions]
    );
  }

  #[test]
  fn import_takes_present_remote_fields() {
    let mut p = RemotePerson::with_id(5);
    p.first_name = Some("Ada".into());
    p.email = Some("ada@example.com".into());
    p.phone = Some("0295700000".into());
    p.mobile = Some("".into());

    let u = UpdateSet::import(&p);
    assert_eq!(u.name.as_ref().unwrap().firstname.as_deref(), Some("Ada"));
    assert_eq!(u.email, Some(Change::Set("ada@example.com".into())));
    assert_eq!(u.phones.len(), 1);
    assert_eq!(u.phones[0].kind, PhoneKind::Landline);
    assert!(u.subscriptions.is_empty());
  }
}
