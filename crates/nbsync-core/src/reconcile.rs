//! Field reconciliation between a local snapshot and a remote one.
//!
//! [`reconcile`] is pure: it returns the [`UpdateSet`] that brings the local
//! side into agreement and never touches either side itself.

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::{
  member::Address,
  snapshot::{ATTRIBUTES, AttributeSpec, Attribute, Clock, FieldValue, LocalSnapshot, Snapshot},
  update::{
    Change, NameParts, PhoneUpdate, SubscriptionAction, SubscriptionUpdate, UpdateKey,
    UpdateSet,
  },
};

/// How conflicts between two non-equal values are settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  /// First link: a non-empty value beats an empty one regardless of age;
  /// recency only decides between two non-empty values.
  Merge,
  /// Already linked: the more recently modified side always wins, even
  /// when its value is empty.
  Overwrite,
}

impl Strategy {
  /// `Overwrite` once the member carries an external id, `Merge` before.
  pub fn for_link(already_linked: bool) -> Self {
    if already_linked { Self::Overwrite } else { Self::Merge }
  }
}

/// Compute the local updates needed for `local` to agree with `remote`.
///
/// Recency is decided per attribute: the local clock named in the attribute
/// table against the remote record's `remote_updated_at`. Ties go to the
/// remote side.
pub fn reconcile(
  local: &LocalSnapshot,
  remote: &Snapshot,
  remote_updated_at: DateTime<Utc>,
  strategy: Strategy,
) -> UpdateSet {
  let mut update = UpdateSet::default();
  if local.snapshot == *remote {
    return update;
  }

  let current = &local.snapshot;
  let mut name = NameParts {
    title:       current.prefix.clone(),
    firstname:   current.first_name.clone(),
    middlenames: current.middle_name.clone(),
    lastname:    current.last_name.clone(),
    gender:      current.sex.clone(),
  };
  let mut name_changed = false;

  for spec in &ATTRIBUTES {
    let ours = current.get(spec.attribute);
    let theirs = remote.get(spec.attribute);
    if ours == theirs {
      continue;
    }

    let local_later = local.clocks.is_later(spec.clock, remote_updated_at);
    let winner = match (strategy, &ours, &theirs) {
      (Strategy::Merge, Some(_), None) => ours.clone(),
      (Strategy::Merge, None, Some(_)) => theirs.clone(),
      _ if local_later => ours.clone(),
      _ => theirs.clone(),
    };
    if same_effect(spec, &winner, &ours) {
      continue;
    }

    trace!(
      attribute = spec.remote_key,
      ?strategy,
      local_later,
      "remote value wins"
    );
    match spec.local_key {
      UpdateKey::Firstname
      | UpdateKey::Middlenames
      | UpdateKey::Lastname
      | UpdateKey::Title
      | UpdateKey::Gender => {
        let value = winner.and_then(FieldValue::into_text);
        match spec.local_key {
          UpdateKey::Firstname => name.firstname = value,
          UpdateKey::Middlenames => name.middlenames = value,
          UpdateKey::Lastname => name.lastname = value,
          UpdateKey::Title => name.title = value,
          _ => name.gender = value,
        }
        name_changed = true;
      }
      UpdateKey::Email => {
        update.email = Some(Change::from_option(winner.and_then(FieldValue::into_text)));
      }
      UpdateKey::Phones => {
        if let Clock::Phone(kind) = spec.clock {
          update.phones.push(PhoneUpdate {
            kind,
            phone: Change::from_option(winner.and_then(FieldValue::into_text)),
          });
        }
      }
      UpdateKey::Subscriptions => {
        if let Clock::Subscription(kind) = spec.clock {
          let subscribed = subscribed_from(spec, &winner);
          update.subscriptions.push(SubscriptionUpdate::new(
            kind,
            SubscriptionAction::from_subscribed(subscribed),
          ));
        }
      }
      UpdateKey::Addresses => {
        update.addresses.push(Change::from_option(
          winner.and_then(FieldValue::into_address).map(Address::from),
        ));
      }
    }
  }

  if name_changed {
    update.name = Some(name);
  }
  update
}

/// Whether a flag attribute means "subscribed". `do_not_call` is inverted
/// and an absent flag reads as `false`.
fn subscribed_from(spec: &AttributeSpec, value: &Option<FieldValue>) -> bool {
  let flag = value.as_ref().and_then(FieldValue::as_flag).unwrap_or(false);
  if spec.attribute == Attribute::DoNotCall { !flag } else { flag }
}

/// Whether applying `winner` would leave the local value as it is.
fn same_effect(
  spec: &AttributeSpec,
  winner: &Option<FieldValue>,
  ours: &Option<FieldValue>,
) -> bool {
  match spec.local_key {
    UpdateKey::Subscriptions => subscribed_from(spec, winner) == subscribed_from(spec, ours),
    _ => winner == ours,
  }
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone};

  use super::*;
  use crate::{member::SubscriptionKind, phone::PhoneKind, snapshot::LocalClocks};

  fn t0() -> DateTime<Utc> { Utc.timestamp_opt(1_700_000_000, 0).unwrap() }

  fn snapshot() -> Snapshot {
    Snapshot {
      email: Some("ada@example.com".into()),
      mobile: Some("0468519266".into()),
      first_name: Some("Ada".into()),
      last_name: Some("Lovelace".into()),
      email_opt_in: Some(true),
      mobile_opt_in: Some(false),
      do_not_call: Some(false),
      ..Snapshot::default()
    }
  }

  fn local(snapshot: Snapshot) -> LocalSnapshot {
    LocalSnapshot {
      snapshot,
      clocks: LocalClocks {
        record:   t0(),
        email:    Some(t0()),
        sms:      Some(t0()),
        calling:  Some(t0()),
        mobile:   Some(t0()),
        landline: None,
      },
    }
  }

  fn earlier() -> DateTime<Utc> { t0() - Duration::hours(1) }
  fn later() -> DateTime<Utc> { t0() + Duration::hours(1) }

  #[test]
  fn equal_snapshots_need_nothing() {
    let s = snapshot();
    for strategy in [Strategy::Merge, Strategy::Overwrite] {
      for at in [earlier(), later()] {
        assert!(reconcile(&local(s.clone()), &s, at, strategy).is_empty());
      }
    }
  }

  #[test]
  fn merge_takes_the_only_non_empty_value() {
    let mut ours = snapshot();
    ours.email = None;
    let theirs = snapshot();

    // Remote is older but holds the only value.
    let u = reconcile(&local(ours), &theirs, earlier(), Strategy::Merge);
    assert_eq!(u.email, Some(Change::Set("ada@example.com".into())));

    // Remote is newer but empty: the local value stays.
    let mut theirs = snapshot();
    theirs.mobile = None;
    let u = reconcile(&local(snapshot()), &theirs, later(), Strategy::Merge);
    assert!(u.is_empty());
  }

  #[test]
  fn merge_lets_recency_decide_between_values() {
    let mut theirs = snapshot();
    theirs.email = Some("ada@analytical.engine".into());

    let u = reconcile(&local(snapshot()), &theirs, earlier(), Strategy::Merge);
    assert!(u.is_empty());

    let u = reconcile(&local(snapshot()), &theirs, later(), Strategy::Merge);
    assert_eq!(u.email, Some(Change::Set("ada@analytical.engine".into())));
  }

  #[test]
  fn overwrite_clears_when_remote_is_later() {
    let mut theirs = snapshot();
    theirs.email = None;

    let u = reconcile(&local(snapshot()), &theirs, later(), Strategy::Overwrite);
    assert_eq!(u.email, Some(Change::Clear));

    let u = reconcile(&local(snapshot()), &theirs, earlier(), Strategy::Overwrite);
    assert!(u.is_empty());
  }

  #[test]
  fn tie_goes_to_remote() {
    let mut theirs = snapshot();
    theirs.email = Some("countess@example.com".into());
    let u = reconcile(&local(snapshot()), &theirs, t0(), Strategy::Overwrite);
    assert_eq!(u.email, Some(Change::Set("countess@example.com".into())));
  }

  #[test]
  fn one_name_part_sends_the_whole_name() {
    let mut theirs = snapshot();
    theirs.middle_name = Some("King".into());

    let u = reconcile(&local(snapshot()), &theirs, later(), Strategy::Overwrite);
    assert_eq!(u.keys(), UpdateKey::NAME_FAMILY.to_vec());
    assert_eq!(
      u.name,
      Some(NameParts {
        title:       None,
        firstname:   Some("Ada".into()),
        middlenames: Some("King".into()),
        lastname:    Some("Lovelace".into()),
        gender:      None,
      })
    );
  }

  #[test]
  fn phones_append_mobile_then_landline() {
    let mut theirs = snapshot();
    theirs.mobile = Some("0411000000".into());
    theirs.phone = Some("0295700000".into());

    let u = reconcile(&local(snapshot()), &theirs, later(), Strategy::Overwrite);
    assert_eq!(
      u.phones,
      vec![
        PhoneUpdate { kind: PhoneKind::Mobile, phone: Change::Set("0411000000".into()) },
        PhoneUpdate { kind: PhoneKind::Landline, phone: Change::Set("0295700000".into()) },
      ]
    );
  }

  #[test]
  fn missing_local_clock_loses_to_remote() {
    // No landline clock locally, so even an old remote landline wins.
    let mut ours = snapshot();
    ours.phone = Some("0295700000".into());
    let theirs = snapshot();
    let u = reconcile(&local(ours), &theirs, earlier(), Strategy::Overwrite);
    assert_eq!(
      u.phones,
      vec![PhoneUpdate { kind: PhoneKind::Landline, phone: Change::Clear }]
    );
  }

  #[test]
  fn do_not_call_unsubscribes_from_calling() {
    let mut theirs = snapshot();
    theirs.do_not_call = Some(true);
    theirs.mobile_opt_in = Some(true);

    let u = reconcile(&local(snapshot()), &theirs, later(), Strategy::Overwrite);
    assert_eq!(
      u.subscriptions,
      vec![
        SubscriptionUpdate::new(SubscriptionKind::Sms, SubscriptionAction::Subscribe),
        SubscriptionUpdate::new(SubscriptionKind::Calling, SubscriptionAction::Unsubscribe),
      ]
    );
  }

  #[test]
  fn absent_remote_flag_reads_as_false() {
    let mut ours = snapshot();
    ours.email_opt_in = Some(false);
    let mut theirs = ours.clone();
    theirs.email_opt_in = None;

    let u = reconcile(&local(ours), &theirs, later(), Strategy::Overwrite);
    assert!(u.subscriptions.is_empty());
  }

  fn with_clocks(record: DateTime<Utc>, email: DateTime<Utc>) -> LocalSnapshot {
    let mut l = local(snapshot());
    l.clocks.record = record;
    l.clocks.email = Some(email);
    l
  }

  fn renamed_and_opted_out() -> Snapshot {
    let mut theirs = snapshot();
    theirs.first_name = Some("Augusta".into());
    theirs.email_opt_in = Some(false);
    theirs
  }

  #[test]
  fn subscription_clock_decides_apart_from_record_clock() {
    // Record edited before the remote, email subscription after.
    let ours = with_clocks(earlier(), later());
    let u = reconcile(&ours, &renamed_and_opted_out(), t0(), Strategy::Overwrite);
    assert_eq!(u.name.and_then(|n| n.firstname).as_deref(), Some("Augusta"));
    assert!(u.subscriptions.is_empty());
  }

  #[test]
  fn record_clock_decides_apart_from_subscription_clock() {
    // Record edited after the remote, email subscription before.
    let ours = with_clocks(later(), earlier());
    let u = reconcile(&ours, &renamed_and_opted_out(), t0(), Strategy::Overwrite);
    assert_eq!(u.name, None);
    assert_eq!(
      u.subscriptions,
      vec![SubscriptionUpdate::new(SubscriptionKind::Email, SubscriptionAction::Unsubscribe)]
    );
  }

  #[test]
  fn strategy_follows_linkage() {
    assert_eq!(Strategy::for_link(false), Strategy::Merge);
    assert_eq!(Strategy::for_link(true), Strategy::Overwrite);
  }
}
