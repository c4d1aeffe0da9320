use crate::identity::{IdentityContext, UserType};
use crate::models::{Message, MessageType};
use crate::repository::Predicate;

/// Default id of the system identity allowed to create messages on behalf of
/// any sender.
pub const DEFAULT_TRUSTED_WORKER_ID: &str = "messages-adapter-worker";

/// Default id of the system identity allowed to read across sender/receiver
/// pairs it does not own.
pub const DEFAULT_AGGREGATOR_ID: &str = "messages-aggregator";

/// Outcome of a permission check. The embedding request layer maps `Denied`
/// to its authorization-denied response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Access {
    Granted,
    Denied,
}

impl Access {
    fn from_bool(allowed: bool) -> Self {
        if allowed {
            Access::Granted
        } else {
            Access::Denied
        }
    }

    pub fn is_granted(self) -> bool {
        matches!(self, Access::Granted)
    }
}

/// The relationship-based access rules, parameterized only by the two
/// designated system identities. Every decision is a pure predicate over the
/// caller's identity context and the operation's target.
#[derive(Debug, Clone)]
pub struct AuthzPolicy {
    pub trusted_worker_id: String,
    pub aggregator_id: String,
}

impl Default for AuthzPolicy {
    fn default() -> Self {
        AuthzPolicy {
            trusted_worker_id: DEFAULT_TRUSTED_WORKER_ID.to_string(),
            aggregator_id: DEFAULT_AGGREGATOR_ID.to_string(),
        }
    }
}

impl AuthzPolicy {
    /// Create-permission: the trusted worker may proxy for anyone; patients
    /// may only send as themselves and only to a location; everyone else must
    /// be the literal sender.
    pub fn can_create(
        &self,
        ctx: &IdentityContext,
        sender: &str,
        receiver_type: UserType,
    ) -> Access {
        if ctx.system_id() == Some(self.trusted_worker_id.as_str()) {
            return Access::Granted;
        }
        if let Some(patient_id) = ctx.patient_id() {
            return Access::from_bool(
                receiver_type == UserType::Location && sender == patient_id,
            );
        }
        Access::from_bool(ctx.holds_id(sender))
    }

    /// Message-by-id permission: the caller must hold the sender or receiver
    /// id under the matching role.
    pub fn can_access_message(&self, ctx: &IdentityContext, message: &Message) -> Access {
        let granted = ctx.asserted_ids().iter().any(|(id, role)| {
            (message.sender == *id && message.sender_type == *role)
                || (message.receiver == *id && message.receiver_type == *role)
        });
        Access::from_bool(granted)
    }

    /// Sender+receiver path permission: either path id must be held by the
    /// caller; the aggregator reads across all pairs.
    pub fn can_query_pair(
        &self,
        ctx: &IdentityContext,
        sender_id: &str,
        receiver_id: &str,
    ) -> Access {
        if self.is_aggregator(ctx) {
            return Access::Granted;
        }
        Access::from_bool(ctx.holds_id(sender_id) || ctx.holds_id(receiver_id))
    }

    /// Combined sender-or-receiver permission: clinicians may probe any id
    /// (visibility is then narrowed by the filter); others must hold the id.
    pub fn can_query_either(&self, ctx: &IdentityContext, unique_id: &str) -> Access {
        if ctx.clinician_id().is_some() {
            return Access::Granted;
        }
        if self.is_aggregator(ctx) {
            return Access::Granted;
        }
        Access::from_bool(ctx.holds_id(unique_id))
    }

    fn is_aggregator(&self, ctx: &IdentityContext) -> bool {
        ctx.is_sole_system(&self.aggregator_id)
    }
}

/// A message is active until confirmed, except callbacks which stay active
/// until explicitly cancelled.
pub fn active() -> Predicate {
    Predicate::Any(vec![
        Predicate::ConfirmedIsNull,
        Predicate::MessageTypeIs(MessageType::Callback),
    ])
}

/// A standing callback request addressed to this receiver, neither confirmed
/// nor cancelled.
pub fn active_callback(receiver_id: &str) -> Predicate {
    Predicate::All(vec![
        Predicate::Receiver(receiver_id.to_string()),
        Predicate::ConfirmedIsNull,
        Predicate::CancelledIsNull,
        Predicate::MessageTypeIs(MessageType::Callback),
    ])
}

fn without_alerts(mut terms: Vec<Predicate>) -> Predicate {
    for alert in MessageType::ALERTS {
        terms.push(Predicate::MessageTypeNot(alert));
    }
    Predicate::All(terms)
}

/// Visibility filter for the combined sender-or-receiver lookup. `None` means
/// the caller has no identity basis for this query at all.
///
/// - A resolved role gives the exact sender/receiver view, minus alert types.
/// - A clinician probing an unresolved id sees the id's traffic with the
///   clinician themselves or their locations, plus all patient traffic.
/// - A system identity sees the plain union.
pub fn sender_or_receiver_filter(ctx: &IdentityContext, unique_id: &str) -> Option<Predicate> {
    if let Some(role) = ctx.user_type_to_validate(unique_id) {
        return Some(Predicate::Any(vec![
            without_alerts(vec![
                Predicate::Sender(unique_id.to_string()),
                Predicate::SenderType(role),
            ]),
            without_alerts(vec![
                Predicate::Receiver(unique_id.to_string()),
                Predicate::ReceiverType(role),
            ]),
        ]));
    }
    if let Some(clinician_id) = ctx.clinician_id() {
        let locations = ctx.location_ids().to_vec();
        return Some(Predicate::Any(vec![
            Predicate::All(vec![
                Predicate::Sender(unique_id.to_string()),
                Predicate::Receiver(clinician_id.to_string()),
                Predicate::ReceiverType(UserType::Clinician),
            ]),
            Predicate::All(vec![
                Predicate::Receiver(unique_id.to_string()),
                Predicate::Sender(clinician_id.to_string()),
                Predicate::SenderType(UserType::Clinician),
            ]),
            Predicate::All(vec![
                Predicate::Sender(unique_id.to_string()),
                Predicate::ReceiverIn(locations.clone()),
                Predicate::ReceiverType(UserType::Location),
            ]),
            Predicate::All(vec![
                Predicate::Receiver(unique_id.to_string()),
                Predicate::SenderIn(locations),
                Predicate::SenderType(UserType::Location),
            ]),
            Predicate::All(vec![
                Predicate::Sender(unique_id.to_string()),
                Predicate::SenderType(UserType::Patient),
            ]),
            Predicate::All(vec![
                Predicate::Receiver(unique_id.to_string()),
                Predicate::ReceiverType(UserType::Patient),
            ]),
        ]));
    }
    if ctx.system_id().is_some() {
        return Some(Predicate::Any(vec![
            Predicate::Sender(unique_id.to_string()),
            Predicate::Receiver(unique_id.to_string()),
        ]));
    }
    None
}
