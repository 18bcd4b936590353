use super::ids::{Principal, ServiceId};
use serde::{Deserialize, Serialize};

/// A billable offering registered by its owner.
///
/// Everything but `active` is fixed at registration.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    pub owner: Principal,
    pub active: bool,
}

impl Service {
    pub fn new(id: ServiceId, name: String, owner: Principal) -> Self {
        Self {
            id,
            name,
            owner,
            active: true,
        }
    }
}
