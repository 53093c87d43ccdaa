mod health_check;
mod users;

pub use health_check::health_check;
pub use users::{login, logout, me, refresh, signup, RefreshGrant};
