//! Single-principal authorization gate.

use constant_time_eq::constant_time_eq;

/// Identifier of a remote principal as delivered by the channel.
pub type PrincipalId = String;

/// Grants access to exactly one configured principal.
///
/// The admin id is fixed at construction and never changes for the lifetime
/// of the process.
#[derive(Debug, Clone)]
pub struct AuthorizationGate {
    admin_id: PrincipalId,
}

impl AuthorizationGate {
    pub fn new(admin_id: impl Into<PrincipalId>) -> Self {
        Self {
            admin_id: admin_id.into().trim().to_string(),
        }
    }

    /// String equality against the admin id, compared in constant time.
    pub fn is_authorized(&self, requesting_id: &str) -> bool {
        !self.admin_id.is_empty()
            && constant_time_eq(requesting_id.trim().as_bytes(), self.admin_id.as_bytes())
    }

    pub fn admin_id(&self) -> &str {
        &self.admin_id
    }
}
