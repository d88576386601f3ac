//! Access-control gate run before any protected handler
//!
//! Missing token, bad signature, expired token, unknown user and disabled
//! user all produce the same `Unauthorized`.

use tracing::debug;

use crate::auth::{extract_token_from_header, is_role_allowed, JwtValidator, Role};
use crate::db::schemas::UserDoc;
use crate::db::Database;
use crate::services::visibility::Viewer;
use crate::types::{Result, WellspringError};

/// The caller of a protected request, loaded fresh from the store
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: UserDoc,
}

impl AuthUser {
    pub fn id(&self) -> &str {
        &self.user.id
    }

    /// Role as currently stored, not as recorded in the token
    pub fn role(&self) -> Role {
        self.user.role()
    }

    pub fn company(&self) -> Option<&str> {
        self.user.company()
    }

    pub fn viewer(&self) -> Viewer {
        Viewer::new(self.id(), self.role())
    }

    pub fn is_super_admin(&self) -> bool {
        self.role() == Role::SuperAdmin
    }
}

/// Resolve the Authorization header to an active user
pub async fn authenticate(
    jwt: &JwtValidator,
    db: &Database,
    auth_header: Option<&str>,
) -> Result<AuthUser> {
    let token = extract_token_from_header(auth_header).ok_or(WellspringError::Unauthorized)?;
    let claims = jwt.verify_token(token)?;

    let user = db
        .collection::<UserDoc>()
        .find_by_id(&claims.sub)
        .await?
        .ok_or(WellspringError::Unauthorized)?;

    if !user.is_active {
        debug!(user_id = %user.id, "rejected token for inactive user");
        return Err(WellspringError::Unauthorized);
    }

    Ok(AuthUser { user })
}

/// Fail with `Forbidden` unless the caller's role is on the allow-list
pub fn require_role(user: &AuthUser, allowed: &[Role]) -> Result<()> {
    if is_role_allowed(user.role(), allowed) {
        Ok(())
    } else {
        Err(WellspringError::Forbidden(format!(
            "Role {} may not perform this action",
            user.role()
        )))
    }
}

/// [`authenticate`] followed by [`require_role`]
pub async fn authorize(
    jwt: &JwtValidator,
    db: &Database,
    auth_header: Option<&str>,
    allowed: &[Role],
) -> Result<AuthUser> {
    let user = authenticate(jwt, db, auth_header).await?;
    require_role(&user, allowed)?;
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{allow, TokenInput};
    use crate::db::schemas::RoleProfile;

    async fn seeded(active: bool) -> (JwtValidator, Database, String) {
        let db = Database::memory();
        let mut user = UserDoc::new(
            "admin@wellspring.kr",
            "hash".into(),
            "Admin",
            RoleProfile::SuperAdmin,
        )
        .unwrap();
        user.is_active = active;
        let jwt = JwtValidator::new_dev();
        let (token, _) = jwt
            .generate_token(TokenInput {
                user_id: user.id.clone(),
                role: Role::SuperAdmin,
                email: user.email.clone(),
            })
            .unwrap();
        db.collection::<UserDoc>().insert_one(user).await.unwrap();
        (jwt, db, format!("Bearer {token}"))
    }

    #[tokio::test]
    async fn test_active_user_passes() {
        let (jwt, db, header) = seeded(true).await;
        let user = authorize(&jwt, &db, Some(&header), allow::SUPER_ADMIN).await.unwrap();
        assert!(user.is_super_admin());
    }

    #[tokio::test]
    async fn test_inactive_and_missing_are_unauthorized() {
        let (jwt, db, header) = seeded(false).await;
        assert!(matches!(
            authenticate(&jwt, &db, Some(&header)).await,
            Err(WellspringError::Unauthorized)
        ));
        assert!(matches!(
            authenticate(&jwt, &db, None).await,
            Err(WellspringError::Unauthorized)
        ));
        assert!(matches!(
            authenticate(&jwt, &Database::memory(), Some(&header)).await,
            Err(WellspringError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_wrong_role_is_forbidden() {
        let (jwt, db, header) = seeded(true).await;
        assert!(matches!(
            authorize(&jwt, &db, Some(&header), allow::SESSION_BOOKING).await,
            Err(WellspringError::Forbidden(_))
        ));
    }
}
