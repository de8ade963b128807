//! Person resolution: which remote person a local member is.
//!
//! A linked member is fetched by its external id and never searched for.
//! Otherwise matching runs email, then mobile, then landline, one
//! single-field `people/match` call each, stopping at the first hit.

use nbsync_core::{
  Error, Result, SYSTEM_NAME,
  member::Member,
  person::{PersonId, RemotePerson},
  phone::strip_trunk_zero,
  remote::RemoteClient,
  snapshot::Snapshot,
  store::MemberStore,
};
use tracing::{debug, warn};

use crate::{Connector, api::MatchField};

/// The validation message the remote API gives for an email it rejects.
const INVALID_EMAIL: &str = "should look like an email address";

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
  /// Found through the member's external id.
  Linked(RemotePerson),
  /// Found by matching; the member is not linked yet.
  Matched(RemotePerson),
  /// No remote person; one must be created.
  Unmatched,
}

impl Resolution {
  pub fn person(&self) -> Option<&RemotePerson> {
    match self {
      Self::Linked(p) | Self::Matched(p) => Some(p),
      Self::Unmatched => None,
    }
  }
}

/// Parse a stored external id back into a remote (person or event) id.
pub fn parse_remote_id(external_id: &str) -> Result<PersonId> {
  external_id
    .trim()
    .parse()
    .map_err(|_| Error::InvalidExternalId(external_id.to_owned()))
}

impl<C: RemoteClient, S: MemberStore> Connector<C, S> {
  pub async fn resolve(&self, member: &Member) -> Result<Resolution> {
    if let Some(ext) = member.external_id(SYSTEM_NAME) {
      let id = parse_remote_id(&ext.external_id)?;
      return Ok(Resolution::Linked(self.api.person(id).await?));
    }

    // Phones are matched in national form without the trunk `0`.
    let snapshot = Snapshot::from_member(member, &self.phones);
    let subscriber = |national: Option<String>| national.map(|n| strip_trunk_zero(&n).to_owned());
    let candidates = [
      (MatchField::Email, snapshot.email),
      (MatchField::Mobile, subscriber(snapshot.mobile)),
      (MatchField::Phone, subscriber(snapshot.phone)),
    ];
    for (field, value) in candidates {
      let Some(value) = value else { continue };
      if let Some(person) = self.api.match_person(field, &value).await? {
        debug!(member_id = %member.member_id, field = field.as_str(), person_id = person.id, "matched");
        return Ok(Resolution::Matched(person));
      }
    }
    Ok(Resolution::Unmatched)
  }

  /// Create a remote person from a snapshot. A rejected email is dropped
  /// and the create retried once.
  pub async fn create_remote(&self, snapshot: &Snapshot) -> Result<RemotePerson> {
    let body = snapshot.to_remote();
    match self.api.create_person(body.clone()).await {
      Err(Error::Validation(e)) if e.mentions(INVALID_EMAIL) && body.contains_key("email") => {
        warn!(email = ?snapshot.email, "remote rejected email; creating without it");
        let mut body = body;
        body.remove("email");
        self.api.create_person(body).await
      }
      other => other,
    }
  }

  /// The member's remote person id, creating the person if needed.
  pub async fn find_or_create(&self, member: &Member) -> Result<PersonId> {
    match self.resolve(member).await? {
      Resolution::Linked(p) | Resolution::Matched(p) => Ok(p.id),
      Resolution::Unmatched => {
        let snapshot = Snapshot::from_member(member, &self.phones);
        Ok(self.create_remote(&snapshot).await?.id)
      }
    }
  }
}
