//! The local member record and its owned sub-records.
//!
//! Members are only ever written by a [`MemberStore`](crate::store::MemberStore);
//! the reconciler reads them through a [`Snapshot`](crate::snapshot::Snapshot).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  person::HomeAddress,
  phone::{PhoneKind, PhoneSettings},
};

// ─── Sub-records ─────────────────────────────────────────────────────────────

/// A phone number in stored (international) form with its own clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneNumber {
  pub phone:      String,
  pub updated_at: DateTime<Utc>,
}

/// A postal address in local vocabulary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
  pub line1:    Option<String>,
  pub line2:    Option<String>,
  pub town:     Option<String>,
  pub state:    Option<String>,
  pub postcode: Option<String>,
  pub country:  Option<String>,
}

impl From<HomeAddress> for Address {
  fn from(a: HomeAddress) -> Self {
    Self {
      line1:    a.address1,
      line2:    a.address2,
      town:     a.city,
      state:    a.state,
      postcode: a.zip,
      country:  a.country_code,
    }
  }
}

/// The three subscriptions the connector keeps in step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionKind {
  Email,
  Sms,
  Calling,
}

impl SubscriptionKind {
  pub const ALL: [Self; 3] = [Self::Email, Self::Sms, Self::Calling];

  pub fn slug(self) -> &'static str {
    match self {
      Self::Email => "email",
      Self::Sms => "sms",
      Self::Calling => "calling",
    }
  }

  pub fn from_slug(slug: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|k| k.slug() == slug)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSubscription {
  pub kind:       SubscriptionKind,
  pub subscribed: bool,
  pub updated_at: DateTime<Utc>,
}

/// A foreign-system identifier attached to a member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalId {
  pub system:      String,
  pub external_id: String,
  pub updated_at:  DateTime<Utc>,
}

// ─── Member ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
  pub member_id:     Uuid,
  pub title:         Option<String>,
  pub first_name:    Option<String>,
  pub middle_names:  Option<String>,
  pub last_name:     Option<String>,
  pub gender:        Option<String>,
  pub email:         Option<String>,
  pub phone_numbers: Vec<PhoneNumber>,
  pub addresses:     Vec<Address>,
  pub subscriptions: Vec<MemberSubscription>,
  pub external_ids:  Vec<ExternalId>,
  pub updated_at:    DateTime<Utc>,
}

impl Member {
  /// A blank member with no contact details.
  pub fn new(member_id: Uuid, updated_at: DateTime<Utc>) -> Self {
    Self {
      member_id,
      title: None,
      first_name: None,
      middle_names: None,
      last_name: None,
      gender: None,
      email: None,
      phone_numbers: Vec::new(),
      addresses: Vec::new(),
      subscriptions: Vec::new(),
      external_ids: Vec::new(),
      updated_at,
    }
  }

  /// The authoritative external id for `system`: the most recently updated
  /// one when several exist.
  pub fn external_id(&self, system: &str) -> Option<&ExternalId> {
    self
      .external_ids
      .iter()
      .filter(|e| e.system == system)
      .max_by_key(|e| e.updated_at)
  }

  /// A copy of this member with every external id for `system` removed.
  pub fn without_external_ids(&self, system: &str) -> Self {
    let mut copy = self.clone();
    copy.external_ids.retain(|e| e.system != system);
    copy
  }

  /// The first stored number of the given kind.
  pub fn phone_of_kind(
    &self,
    kind: PhoneKind,
    settings: &PhoneSettings,
  ) -> Option<&PhoneNumber> {
    self
      .phone_numbers
      .iter()
      .find(|p| settings.classify(&p.phone) == kind)
  }

  pub fn home_address(&self) -> Option<&Address> { self.addresses.first() }

  pub fn subscription(&self, kind: SubscriptionKind) -> Option<&MemberSubscription> {
    self.subscriptions.iter().find(|s| s.kind == kind)
  }

  pub fn is_subscribed_to(&self, kind: SubscriptionKind) -> bool {
    self.subscription(kind).is_some_and(|s| s.subscribed)
  }
}
