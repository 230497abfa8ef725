use serde::{Deserialize, Serialize};

use crate::entities::Route;
use crate::session::{PermissionName, RoleName, SessionStore, User};

/// What to do when the user record carries no role (or permission) data at all.
///
/// `Allow` keeps the established behavior of treating an empty list as
/// "not configured yet" and granting access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingRoleData {
    #[default]
    Allow,
    Deny,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccessPolicy {
    #[serde(default)]
    pub on_missing_role_data: MissingRoleData,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RouteRequirement {
    pub roles: Vec<RoleName>,
    pub permissions: Vec<PermissionName>,
}

impl RouteRequirement {
    /// Any authenticated user.
    pub fn authenticated() -> Self {
        Self::default()
    }

    pub fn any_role<I, R>(roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<RoleName>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
            permissions: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_permissions<I, P>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PermissionName>,
    {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuardDecision {
    /// Boot resolution not finished; render a neutral loading state.
    Pending,
    RedirectToLogin,
    AccessDenied,
    Granted,
}

impl AccessPolicy {
    pub fn new(on_missing_role_data: MissingRoleData) -> Self {
        Self { on_missing_role_data }
    }

    pub fn has_role(&self, user: Option<&User>, required: &[RoleName]) -> bool {
        match user {
            Some(user) => self.any_of(&user.roles, required),
            None => false,
        }
    }

    pub fn has_permission(&self, user: Option<&User>, required: &[PermissionName]) -> bool {
        match user {
            Some(user) => self.any_of(&user.permissions, required),
            None => false,
        }
    }

    fn any_of<T: PartialEq>(&self, held: &[T], required: &[T]) -> bool {
        if required.is_empty() {
            return true;
        }
        if held.is_empty() {
            return self.on_missing_role_data == MissingRoleData::Allow;
        }
        required.iter().any(|r| held.contains(r))
    }

    pub fn evaluate(&self, session: &SessionStore, requirement: &RouteRequirement) -> GuardDecision {
        if session.is_loading() {
            return GuardDecision::Pending;
        }
        if !session.is_authenticated() {
            return GuardDecision::RedirectToLogin;
        }

        let user = session.user();
        if self.has_role(user, &requirement.roles) && self.has_permission(user, &requirement.permissions) {
            GuardDecision::Granted
        } else {
            GuardDecision::AccessDenied
        }
    }
}

/// Navigation entries the current session may open. Empty while booting or
/// signed out.
pub fn visible_navigation(policy: &AccessPolicy, session: &SessionStore) -> Vec<Route> {
    Route::navigation()
        .filter(|route| {
            route
                .requirement()
                .is_some_and(|req| policy.evaluate(session, &req) == GuardDecision::Granted)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Credentials, LoginGrant};
    use secrecy::SecretString;

    fn roles(names: &[&str]) -> Vec<RoleName> {
        names.iter().copied().map(RoleName::from).collect()
    }

    fn signed_in(user: User) -> SessionStore {
        let mut store = SessionStore::new();
        store.restore(Ok(None));
        store.begin_login(Credentials::new("x@example.org", "pw"));
        store.login_completed(Ok(LoginGrant {
            token: SecretString::new("t".into()),
            user,
        }));
        store
    }

    #[test]
    fn role_check_uses_or_semantics() {
        let policy = AccessPolicy::default();
        let required = roles(&["admin", "doctor"]);

        let doctor = User::new("1", "D", "d@x").with_roles(["doctor"]);
        let nurse = User::new("2", "N", "n@x").with_roles(["nurse"]);

        assert!(policy.has_role(Some(&doctor), &required));
        assert!(!policy.has_role(Some(&nurse), &required));
    }

    #[test]
    fn missing_role_data_follows_policy() {
        let bare = User::new("1", "B", "b@x");
        let required = roles(&["admin"]);

        assert!(AccessPolicy::new(MissingRoleData::Allow).has_role(Some(&bare), &required));
        assert!(!AccessPolicy::new(MissingRoleData::Deny).has_role(Some(&bare), &required));
    }

    #[test]
    fn no_user_never_has_role() {
        assert!(!AccessPolicy::default().has_role(None, &roles(&["admin"])));
    }

    #[test]
    fn empty_requirement_is_satisfied() {
        let nurse = User::new("2", "N", "n@x").with_roles(["nurse"]);
        let policy = AccessPolicy::new(MissingRoleData::Deny);
        assert!(policy.has_role(Some(&nurse), &[]));
        assert!(policy.has_permission(Some(&nurse), &[]));
    }

    #[test]
    fn permissions_use_or_semantics() {
        let user = User::new("1", "U", "u@x")
            .with_roles(["clerk"])
            .with_permissions(["invoices.read"]);
        let policy = AccessPolicy::new(MissingRoleData::Deny);

        let required = vec![PermissionName::new("invoices.write"), PermissionName::new("invoices.read")];
        assert!(policy.has_permission(Some(&user), &required));
        assert!(!policy.has_permission(Some(&user), &[PermissionName::new("beds.write")]));
    }

    #[test]
    fn guard_pending_while_booting() {
        let store = SessionStore::new();
        let decision = AccessPolicy::default().evaluate(&store, &RouteRequirement::authenticated());
        assert_eq!(decision, GuardDecision::Pending);
    }

    #[test]
    fn guard_redirects_when_signed_out() {
        let mut store = SessionStore::new();
        store.restore(Ok(None));
        let decision = AccessPolicy::default().evaluate(&store, &RouteRequirement::authenticated());
        assert_eq!(decision, GuardDecision::RedirectToLogin);
    }

    #[test]
    fn guard_denies_without_redirect() {
        let store = signed_in(User::new("2", "N", "n@x").with_roles(["nurse"]));
        let requirement = RouteRequirement::any_role(["admin"]);
        assert_eq!(
            AccessPolicy::default().evaluate(&store, &requirement),
            GuardDecision::AccessDenied
        );
    }

    #[test]
    fn guard_requires_both_roles_and_permissions() {
        let store = signed_in(
            User::new("1", "A", "a@x")
                .with_roles(["admin"])
                .with_permissions(["reports.read"]),
        );
        let policy = AccessPolicy::default();

        let ok = RouteRequirement::any_role(["admin"]).with_permissions(["reports.read"]);
        let missing_perm = RouteRequirement::any_role(["admin"]).with_permissions(["beds.write"]);

        assert_eq!(policy.evaluate(&store, &ok), GuardDecision::Granted);
        assert_eq!(policy.evaluate(&store, &missing_perm), GuardDecision::AccessDenied);
    }

    #[test]
    fn navigation_filtered_by_role() {
        use crate::entities::EntityKind;

        let nurse = signed_in(User::new("2", "N", "n@x").with_roles(["nurse"]));
        let nav = visible_navigation(&AccessPolicy::default(), &nurse);

        assert!(nav.contains(&Route::Dashboard));
        assert!(nav.contains(&Route::Entity(EntityKind::BedAssignments)));
        assert!(!nav.contains(&Route::Entity(EntityKind::Departments)));
        assert!(!nav.contains(&Route::Login));
    }

    #[test]
    fn navigation_fail_open_and_closed() {
        use crate::entities::EntityKind;

        let bare = signed_in(User::new("3", "B", "b@x"));

        let open = visible_navigation(&AccessPolicy::new(MissingRoleData::Allow), &bare);
        assert_eq!(open.len(), EntityKind::ALL.len() + 1);

        let closed = visible_navigation(&AccessPolicy::new(MissingRoleData::Deny), &bare);
        assert_eq!(closed, vec![Route::Dashboard]);
    }

    #[test]
    fn navigation_empty_when_signed_out() {
        let mut store = SessionStore::new();
        store.restore(Ok(None));
        assert!(visible_navigation(&AccessPolicy::default(), &store).is_empty());
    }

    #[test]
    fn policy_deserializes_lowercase() {
        let policy: AccessPolicy = serde_json::from_str(r#"{"on_missing_role_data":"deny"}"#).unwrap();
        assert_eq!(policy.on_missing_role_data, MissingRoleData::Deny);
    }
}
