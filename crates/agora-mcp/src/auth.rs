use std::collections::HashSet;

/// The caller's granted scopes. Session-authenticated callers get `All`;
/// token callers carry an explicit set.
#[derive(Debug, Clone)]
pub enum ScopeSet {
    All,
    Scopes(HashSet<String>),
}

impl ScopeSet {
    pub fn from_iter<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Scopes(scopes.into_iter().map(Into::into).collect())
    }

    /// Whether this set admits an item gated on `required` (`None` = public).
    pub fn admits(&self, required: Option<&str>) -> bool {
        match (self, required) {
            (_, None) => true,
            (ScopeSet::All, _) => true,
            (ScopeSet::Scopes(scopes), Some(required)) => scopes.contains(required),
        }
    }
}

#[derive(Debug, Clone)]
pub struct McpAuth {
    pub scopes: ScopeSet,
    /// Authenticated principal, when the transport established one.
    pub user_id: Option<agora_core::id::UserId>,
}

impl McpAuth {
    pub fn session() -> Self {
        Self {
            scopes: ScopeSet::All,
            user_id: None,
        }
    }

    pub fn with_scopes<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scopes: ScopeSet::from_iter(scopes),
            user_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_items_always_admitted() {
        assert!(ScopeSet::from_iter(Vec::<String>::new()).admits(None));
        assert!(ScopeSet::All.admits(None));
    }

    #[test]
    fn session_auth_is_all_scopes() {
        assert!(ScopeSet::All.admits(Some("admin")));
    }

    #[test]
    fn explicit_sets_are_exact() {
        let scopes = ScopeSet::from_iter(["read:groups"]);
        assert!(scopes.admits(Some("read:groups")));
        assert!(!scopes.admits(Some("read:events")));
        assert!(!scopes.admits(Some("admin")));
    }
}
