//! Resolver output for the shelter reference dataset.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::types::ShelterId;

/// What the objective resolver hands back for a public code.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ShelterRef {
    pub id: ShelterId,
    pub public_code: String,
    pub name: String,
}
