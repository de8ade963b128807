//! The comparable snapshot: a normalised projection of either side over a
//! fixed attribute set.
//!
//! Both directions of reconciliation go through [`ATTRIBUTES`], an explicit
//! table of `{remote key, local key, clock source, accumulation}`. Nothing is
//! discovered reflectively.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::{
  member::{Member, SubscriptionKind},
  person::{HomeAddress, RemotePerson, blank_to_none},
  phone::{PhoneKind, PhoneSettings},
  update::UpdateKey,
};

// ─── Attribute table ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
  FirstName,
  MiddleName,
  LastName,
  Prefix,
  Sex,
  Email,
  Mobile,
  Phone,
  EmailOptIn,
  MobileOptIn,
  DoNotCall,
  HomeAddress,
}

/// Which local timestamp decides recency for an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clock {
  Record,
  Subscription(SubscriptionKind),
  Phone(PhoneKind),
}

/// Whether a changed attribute replaces its update key or appends to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accumulate {
  Replace,
  Append,
}

#[derive(Debug, Clone, Copy)]
pub struct AttributeSpec {
  pub attribute:  Attribute,
  pub remote_key: &'static str,
  pub local_key:  UpdateKey,
  pub clock:      Clock,
  pub accumulate: Accumulate,
}

const fn spec(
  attribute: Attribute,
  remote_key: &'static str,
  local_key: UpdateKey,
  clock: Clock,
  accumulate: Accumulate,
) -> AttributeSpec {
  AttributeSpec { attribute, remote_key, local_key, clock, accumulate }
}

/// Every reconciled attribute, in evaluation order. Mobile is evaluated
/// before landline so their `phones` entries append in that order.
pub const ATTRIBUTES: [AttributeSpec; 12] = [
  spec(Attribute::FirstName, "first_name", UpdateKey::Firstname, Clock::Record, Accumulate::Replace),
  spec(Attribute::MiddleName, "middle_name", UpdateKey::Middlenames, Clock::Record, Accumulate::Replace),
  spec(Attribute::LastName, "last_name", UpdateKey::Lastname, Clock::Record, Accumulate::Replace),
  spec(Attribute::Prefix, "prefix", UpdateKey::Title, Clock::Record, Accumulate::Replace),
  spec(Attribute::Sex, "sex", UpdateKey::Gender, Clock::Record, Accumulate::Replace),
  spec(Attribute::Email, "email", UpdateKey::Email, Clock::Record, Accumulate::Replace),
  spec(Attribute::Mobile, "mobile", UpdateKey::Phones, Clock::Phone(PhoneKind::Mobile), Accumulate::Append),
  spec(Attribute::Phone, "phone", UpdateKey::Phones, Clock::Phone(PhoneKind::Landline), Accumulate::Append),
  spec(
    Attribute::EmailOptIn,
    "email_opt_in",
    UpdateKey::Subscriptions,
    Clock::Subscription(SubscriptionKind::Email),
    Accumulate::Append,
  ),
  spec(
    Attribute::MobileOptIn,
    "mobile_opt_in",
    UpdateKey::Subscriptions,
    Clock::Subscription(SubscriptionKind::Sms),
    Accumulate::Append,
  ),
  spec(
    Attribute::DoNotCall,
    "do_not_call",
    UpdateKey::Subscriptions,
    Clock::Subscription(SubscriptionKind::Calling),
    Accumulate::Append,
  ),
  spec(Attribute::HomeAddress, "home_address", UpdateKey::Addresses, Clock::Record, Accumulate::Append),
];

/// Remote keys the remote side replaces as a single name structure.
const NAME_KEYS: [&str; 5] = ["prefix", "first_name", "middle_name", "last_name", "sex"];

// ─── Values ──────────────────────────────────────────────────────────────────

/// One non-empty attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
  Text(String),
  Flag(bool),
  Address(HomeAddress),
}

impl FieldValue {
  pub fn into_text(self) -> Option<String> {
    match self {
      Self::Text(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_flag(&self) -> Option<bool> {
    match self {
      Self::Flag(b) => Some(*b),
      _ => None,
    }
  }

  pub fn into_address(self) -> Option<HomeAddress> {
    match self {
      Self::Address(a) => Some(a),
      _ => None,
    }
  }
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// Equality over exactly these fields defines "in sync". Blank strings are
/// normalised to `None` on construction so the derived `PartialEq` is the
/// right comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
  pub email:         Option<String>,
  pub mobile:        Option<String>,
  pub phone:         Option<String>,
  pub prefix:        Option<String>,
  pub sex:           Option<String>,
  pub first_name:    Option<String>,
  pub middle_name:   Option<String>,
  pub last_name:     Option<String>,
  pub email_opt_in:  Option<bool>,
  pub mobile_opt_in: Option<bool>,
  pub do_not_call:   Option<bool>,
  pub home_address:  Option<HomeAddress>,
}

impl Snapshot {
  /// Project a local member. Phones are rendered in national form.
  pub fn from_member(member: &Member, phones: &PhoneSettings) -> Self {
    let number = |kind| {
      member
        .phone_of_kind(kind, phones)
        .map(|p| phones.to_national(&p.phone))
    };
    Self {
      email:         blank_to_none(member.email.clone()),
      mobile:        blank_to_none(number(PhoneKind::Mobile)),
      phone:         blank_to_none(number(PhoneKind::Landline)),
      prefix:        blank_to_none(member.title.clone()),
      sex:           blank_to_none(member.gender.clone()),
      first_name:    blank_to_none(member.first_name.clone()),
      middle_name:   blank_to_none(member.middle_names.clone()),
      last_name:     blank_to_none(member.last_name.clone()),
      email_opt_in:  Some(member.is_subscribed_to(SubscriptionKind::Email)),
      mobile_opt_in: Some(member.is_subscribed_to(SubscriptionKind::Sms)),
      do_not_call:   Some(!member.is_subscribed_to(SubscriptionKind::Calling)),
      home_address:  member
        .home_address()
        .cloned()
        .and_then(|a| HomeAddress::from(a).normalized()),
    }
  }

  /// Project a remote person. Unknown remote fields are ignored.
  pub fn from_remote(person: &RemotePerson) -> Self {
    Self {
      email:         blank_to_none(person.email.clone()),
      mobile:        blank_to_none(person.mobile.clone()),
      phone:         blank_to_none(person.phone.clone()),
      prefix:        blank_to_none(person.prefix.clone()),
      sex:           blank_to_none(person.sex.clone()),
      first_name:    blank_to_none(person.first_name.clone()),
      middle_name:   blank_to_none(person.middle_name.clone()),
      last_name:     blank_to_none(person.last_name.clone()),
      email_opt_in:  person.email_opt_in,
      mobile_opt_in: person.mobile_opt_in,
      do_not_call:   person.do_not_call,
      home_address:  person.home_address.clone().and_then(HomeAddress::normalized),
    }
  }

  /// The value of one attribute, `None` when empty.
  pub fn get(&self, attribute: Attribute) -> Option<FieldValue> {
    let text = |v: &Option<String>| v.clone().map(FieldValue::Text);
    match attribute {
      Attribute::FirstName => text(&self.first_name),
      Attribute::MiddleName => text(&self.middle_name),
      Attribute::LastName => text(&self.last_name),
      Attribute::Prefix => text(&self.prefix),
      Attribute::Sex => text(&self.sex),
      Attribute::Email => text(&self.email),
      Attribute::Mobile => text(&self.mobile),
      Attribute::Phone => text(&self.phone),
      Attribute::EmailOptIn => self.email_opt_in.map(FieldValue::Flag),
      Attribute::MobileOptIn => self.mobile_opt_in.map(FieldValue::Flag),
      Attribute::DoNotCall => self.do_not_call.map(FieldValue::Flag),
      Attribute::HomeAddress => self.home_address.clone().map(FieldValue::Address),
    }
  }

  fn remote_value(&self, attribute: Attribute) -> Value {
    match self.get(attribute) {
      Some(FieldValue::Text(s)) => json!(s),
      Some(FieldValue::Flag(b)) => json!(b),
      Some(FieldValue::Address(a)) => json!(a),
      None => Value::Null,
    }
  }

  /// Every non-empty attribute under its remote key; the body of a create.
  pub fn to_remote(&self) -> Map<String, Value> {
    ATTRIBUTES
      .iter()
      .filter(|s| self.get(s.attribute).is_some())
      .map(|s| (s.remote_key.to_string(), self.remote_value(s.attribute)))
      .collect()
  }

  /// The attributes where `self` differs from `remote`, under remote keys,
  /// with `null` for values to remove. If any name part differs, every name
  /// part is included since the remote side replaces the name as a whole.
  pub fn remote_diff(&self, remote: &Snapshot) -> Map<String, Value> {
    let mut diff: Map<String, Value> = ATTRIBUTES
      .iter()
      .filter(|s| self.get(s.attribute) != remote.get(s.attribute))
      .map(|s| (s.remote_key.to_string(), self.remote_value(s.attribute)))
      .collect();

    if NAME_KEYS.iter().any(|k| diff.contains_key(*k)) {
      for s in ATTRIBUTES.iter().filter(|s| NAME_KEYS.contains(&s.remote_key)) {
        diff
          .entry(s.remote_key.to_string())
          .or_insert_with(|| self.remote_value(s.attribute));
      }
    }
    diff
  }
}

// ─── Local clocks ────────────────────────────────────────────────────────────

/// The local side's timestamps, one per [`Clock`] source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalClocks {
  pub record:   DateTime<Utc>,
  pub email:    Option<DateTime<Utc>>,
  pub sms:      Option<DateTime<Utc>>,
  pub calling:  Option<DateTime<Utc>>,
  pub mobile:   Option<DateTime<Utc>>,
  pub landline: Option<DateTime<Utc>>,
}

impl LocalClocks {
  pub fn from_member(member: &Member, phones: &PhoneSettings) -> Self {
    let sub = |kind| member.subscription(kind).map(|s| s.updated_at);
    let phone = |kind| member.phone_of_kind(kind, phones).map(|p| p.updated_at);
    Self {
      record:   member.updated_at,
      email:    sub(SubscriptionKind::Email),
      sms:      sub(SubscriptionKind::Sms),
      calling:  sub(SubscriptionKind::Calling),
      mobile:   phone(PhoneKind::Mobile),
      landline: phone(PhoneKind::Landline),
    }
  }

  pub fn get(&self, clock: Clock) -> Option<DateTime<Utc>> {
    match clock {
      Clock::Record => Some(self.record),
      Clock::Subscription(SubscriptionKind::Email) => self.email,
      Clock::Subscription(SubscriptionKind::Sms) => self.sms,
      Clock::Subscription(SubscriptionKind::Calling) => self.calling,
      Clock::Phone(PhoneKind::Mobile) => self.mobile,
      Clock::Phone(PhoneKind::Landline) => self.landline,
    }
  }

  /// Strictly newer than `remote`. A missing local clock is never newer.
  pub fn is_later(&self, clock: Clock, remote: DateTime<Utc>) -> bool {
    self.get(clock).is_some_and(|local| local > remote)
  }
}

/// A local snapshot together with the clocks that decide recency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSnapshot {
  pub snapshot: Snapshot,
  pub clocks:   LocalClocks,
}

impl LocalSnapshot {
  pub fn from_member(member: &Member, phones: &PhoneSettings) -> Self {
    Self {
      snapshot: Snapshot::from_member(member, phones),
      clocks:   LocalClocks::from_member(member, phones),
    }
  }

  /// Record-level comparison: the local record changed after the remote one.
  pub fn newer_than(&self, person: &RemotePerson) -> bool {
    person.updated_at.is_some_and(|remote| self.clocks.record > remote)
  }

  /// Record-level comparison: the remote record changed after the local one.
  pub fn older_than(&self, person: &RemotePerson) -> bool {
    person.updated_at.is_some_and(|remote| self.clocks.record < remote)
  }
}
