mod curricula;
mod stats;
mod users;

pub use curricula::*;
pub use stats::*;
pub use users::*;

use crate::services::{admin_service::AdminService, AppState};

fn service(state: &AppState) -> AdminService {
    AdminService::new(state.storage.clone())
}
