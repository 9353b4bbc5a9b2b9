//! Local RBAC users

use serde::Serialize;
use serde_json::Value;

use super::{Cluster, OK, settings_form};
use crate::error::{ClusterError, Result};
use crate::transport::Request;

impl Cluster {
    pub async fn users(&self) -> Result<Value> {
        self.get_json(&["settings", "rbac", "users"], "get users")
            .await
    }

    /// Create or replace a local user.
    ///
    /// `user_config` holds `password`, `name`, `roles` and so on; a `roles`
    /// list is sent as a comma-separated value.
    pub async fn create_user<T: Serialize + ?Sized>(&self, username: &str, user_config: &T) -> Result<()> {
        let url = self.endpoint(&["settings", "rbac", "users", "local", username])?;
        self.send(Request::put(url).body(settings_form(user_config)?))
            .await?
            .ensure(OK, |_, body| ClusterError::UserCreation(body))?;
        Ok(())
    }
}
