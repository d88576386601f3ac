//! Accounts: registration, login, profile reads and counselor rates

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::{
    check_password_policy, hash_password, verify_password, JwtValidator, Role, TokenInput,
};
use crate::db::schemas::{
    AnnualUsage, CompanyDoc, MethodRates, RoleProfile, TaxRate, UserDoc,
};
use crate::db::{Database, Filter};
use crate::services::visibility::Viewer;
use crate::types::{FieldError, Result, WellspringError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub employee_number: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Account created by a super-admin
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounselorView {
    pub custom_rate: i64,
    pub use_system_rate: bool,
    pub effective_rate: i64,
    pub method_rates: MethodRatesView,
    pub tax_rate: TaxRate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counseling_center: Option<String>,
    pub is_independent: bool,
    pub total_sessions: i64,
    pub rating: f64,
    pub specialties: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodRatesView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_to_face: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_video: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageView {
    pub year: i32,
    pub used: i32,
    pub limit: i32,
    pub remaining: i32,
}

impl From<&AnnualUsage> for UsageView {
    fn from(u: &AnnualUsage) -> Self {
        Self {
            year: u.year,
            used: u.used,
            limit: u.limit,
            remaining: u.remaining(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annual_counseling_usage: Option<UsageView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counselor: Option<CounselorView>,
}

impl UserView {
    pub fn new(user: &UserDoc, system_rate: i64) -> Self {
        let annual_counseling_usage = match &user.profile {
            RoleProfile::Employee(p) => Some(UsageView::from(&p.annual_counseling_usage)),
            _ => None,
        };
        let counselor = user.counselor().map(|p| CounselorView {
            custom_rate: p.custom_rate,
            use_system_rate: p.use_system_rate,
            effective_rate: p.effective_rate(system_rate),
            method_rates: MethodRatesView {
                face_to_face: p.method_rates.face_to_face,
                phone_video: p.method_rates.phone_video,
                chat: p.method_rates.chat,
            },
            tax_rate: p.tax_rate,
            counseling_center: p.counseling_center().map(str::to_string),
            is_independent: p.is_independent(),
            total_sessions: p.total_sessions,
            rating: p.rating,
            specialties: p.specialties.clone(),
        });
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role(),
            is_active: user.is_active,
            phone: user.phone.clone(),
            company: user.company().map(str::to_string),
            department: user.profile.department().map(str::to_string),
            annual_counseling_usage,
            counselor,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: u64,
    pub user: UserView,
}

fn check_password(password: &str) -> Result<()> {
    match check_password_policy(password) {
        Some(err) => Err(WellspringError::Validation(vec![err])),
        None => Ok(()),
    }
}

async fn ensure_email_free(db: &Database, email: &str) -> Result<()> {
    let taken = db
        .collection::<UserDoc>()
        .count(Filter::new().eq("email", email.trim().to_lowercase()))
        .await?;
    if taken > 0 {
        return Err(WellspringError::Conflict("E-mail is already registered".into()));
    }
    Ok(())
}

/// Employee self-registration, matched to a company by e-mail domain
pub async fn register(db: &Database, req: RegisterRequest) -> Result<UserDoc> {
    check_password(&req.password)?;
    let email = req.email.trim().to_lowercase();
    let domain = email
        .rsplit_once('@')
        .map(|(_, d)| d.to_string())
        .ok_or_else(|| WellspringError::invalid("email", "must be a valid e-mail address"))?;

    let company = db
        .collection::<CompanyDoc>()
        .find_one(Filter::new().eq("domain", domain.as_str()).eq("is_active", true))
        .await?
        .filter(|c| c.settings.allow_self_registration)
        .ok_or_else(|| {
            WellspringError::Forbidden("Self-registration is not enabled for this e-mail domain".into())
        })?;

    let headcount = db
        .collection::<UserDoc>()
        .count(Filter::new().eq("company", company.id.as_str()).eq("role", Role::Employee.as_str()))
        .await?;
    if headcount as i64 >= company.settings.max_employees {
        return Err(WellspringError::Conflict(
            "Company has reached its employee limit".into(),
        ));
    }

    ensure_email_free(db, &email).await?;

    let mut profile = RoleProfile::for_role(
        Role::Employee,
        Some(company.id.clone()),
        Utc::now().year(),
        company.settings.annual_counseling_limit,
    )?;
    if let RoleProfile::Employee(p) = &mut profile {
        p.department = req.department.filter(|d| !d.trim().is_empty());
        p.employee_number = req.employee_number;
    }

    let mut user = UserDoc::new(&email, hash_password(&req.password)?, &req.name, profile)?;
    user.phone = req.phone;
    db.collection::<UserDoc>().insert_one(user.clone()).await?;

    info!(user_id = %user.id, company = %company.id, "employee registered");
    Ok(user)
}

/// Account creation by a super-admin (staff, admins, employees)
pub async fn create_user(db: &Database, req: CreateUserRequest) -> Result<UserDoc> {
    check_password(&req.password)?;
    ensure_email_free(db, &req.email).await?;

    let mut annual_limit = crate::db::schemas::DEFAULT_ANNUAL_LIMIT;
    if let Some(company_id) = req.company.as_deref().filter(|_| req.role.requires_company()) {
        let company = db
            .collection::<CompanyDoc>()
            .find_by_id(company_id)
            .await?
            .ok_or_else(|| WellspringError::invalid("company", "does not exist"))?;
        annual_limit = company.settings.annual_counseling_limit;
    }

    let mut profile = RoleProfile::for_role(req.role, req.company, Utc::now().year(), annual_limit)?;
    match &mut profile {
        RoleProfile::Employee(p) => p.department = req.department,
        RoleProfile::Manager(p) | RoleProfile::CompanyAdmin(p) => p.department = req.department,
        _ => {}
    }

    let mut user = UserDoc::new(&req.email, hash_password(&req.password)?, &req.name, profile)?;
    user.phone = req.phone;
    db.collection::<UserDoc>().insert_one(user.clone()).await?;

    info!(user_id = %user.id, role = %user.role(), "account created");
    Ok(user)
}

/// Verify credentials; every failure is the same `Unauthorized`
pub async fn login(
    db: &Database,
    jwt: &JwtValidator,
    req: LoginRequest,
    system_rate: i64,
) -> Result<LoginResponse> {
    let user = db
        .collection::<UserDoc>()
        .find_one(Filter::new().eq("email", req.email.trim().to_lowercase()))
        .await?
        .ok_or(WellspringError::Unauthorized)?;

    if !user.is_active || !verify_password(&req.password, &user.password_hash)? {
        return Err(WellspringError::Unauthorized);
    }

    let (token, _) = jwt.generate_token(TokenInput {
        user_id: user.id.clone(),
        role: user.role(),
        email: user.email.clone(),
    })?;

    info!(user_id = %user.id, role = %user.role(), "login");
    Ok(LoginResponse {
        token,
        expires_in: jwt.expiry_seconds(),
        user: UserView::new(&user, system_rate),
    })
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RateUpdate {
    #[serde(default)]
    pub custom_rate: Option<i64>,
    #[serde(default)]
    pub use_system_rate: Option<bool>,
    #[serde(default)]
    pub face_to_face_rate: Option<i64>,
    #[serde(default)]
    pub phone_video_rate: Option<i64>,
    #[serde(default)]
    pub chat_rate: Option<i64>,
    #[serde(default)]
    pub tax_rate: Option<TaxRate>,
}

/// Upper bound for any per-session rate, in won
pub const MAX_SESSION_RATE: i64 = 10_000_000;

/// Set a counselor's rates; allowed for super-admin and the counselor
pub async fn update_counselor_rate(
    db: &Database,
    actor: &Viewer,
    counselor_id: &str,
    update: RateUpdate,
) -> Result<UserDoc> {
    if actor.role != Role::SuperAdmin && actor.id != counselor_id {
        return Err(WellspringError::Forbidden(
            "Only the counselor or a super-admin may change rates".into(),
        ));
    }

    let mut errors = Vec::new();
    for (field, value) in [
        ("customRate", update.custom_rate),
        ("faceToFaceRate", update.face_to_face_rate),
        ("phoneVideoRate", update.phone_video_rate),
        ("chatRate", update.chat_rate),
    ] {
        match value {
            Some(v) if v < 0 => errors.push(FieldError::new(field, "must not be negative")),
            Some(v) if v > MAX_SESSION_RATE => errors.push(FieldError::new(
                field,
                format!("must not exceed {MAX_SESSION_RATE}"),
            )),
            _ => {}
        }
    }
    if !errors.is_empty() {
        return Err(WellspringError::Validation(errors));
    }

    let users = db.collection::<UserDoc>();
    let mut user = users
        .find_by_id(counselor_id)
        .await?
        .ok_or_else(|| WellspringError::NotFound("Counselor".into()))?;
    let profile = user
        .counselor_mut()
        .ok_or_else(|| WellspringError::NotFound("Counselor".into()))?;

    if let Some(rate) = update.custom_rate {
        profile.custom_rate = rate;
    }
    if let Some(flag) = update.use_system_rate {
        profile.use_system_rate = flag;
    }
    let rates = &mut profile.method_rates;
    *rates = MethodRates {
        face_to_face: update.face_to_face_rate.or(rates.face_to_face),
        phone_video: update.phone_video_rate.or(rates.phone_video),
        chat: update.chat_rate.or(rates.chat),
    };
    if let Some(tax) = update.tax_rate {
        profile.tax_rate = tax;
    }

    users.replace(&mut user).await?;
    info!(counselor = %counselor_id, by = %actor.id, "counselor rates updated");
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::Plan;

    async fn company(db: &Database, self_registration: bool) -> CompanyDoc {
        let mut company = CompanyDoc::new("Acme".into(), "acme.kr".into(), Plan::Standard, 0);
        company.settings.allow_self_registration = self_registration;
        company.settings.annual_counseling_limit = 8;
        db.collection::<CompanyDoc>().insert_one(company.clone()).await.unwrap();
        company
    }

    fn request(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.into(),
            password: "welcome2024".into(),
            name: "Park Employee".into(),
            department: Some("Sales".into()),
            employee_number: None,
            phone: None,
        }
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let db = Database::memory();
        let acme = company(&db, true).await;
        let user = register(&db, request("park@acme.kr")).await.unwrap();
        assert_eq!(user.company(), Some(acme.id.as_str()));
        match &user.profile {
            RoleProfile::Employee(p) => assert_eq!(p.annual_counseling_usage.limit, 8),
            other => panic!("unexpected profile {other:?}"),
        }

        let jwt = JwtValidator::new_dev();
        let response = login(
            &db,
            &jwt,
            LoginRequest { email: "PARK@acme.kr".into(), password: "welcome2024".into() },
            50_000,
        )
        .await
        .unwrap();
        assert_eq!(jwt.verify_token(&response.token).unwrap().sub, user.id);

        let wrong = login(
            &db,
            &jwt,
            LoginRequest { email: "park@acme.kr".into(), password: "nope12345".into() },
            50_000,
        )
        .await;
        assert!(matches!(wrong, Err(WellspringError::Unauthorized)));

        assert!(matches!(
            register(&db, request("park@acme.kr")).await,
            Err(WellspringError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_register_requires_company_opt_in() {
        let db = Database::memory();
        company(&db, false).await;
        assert!(matches!(
            register(&db, request("kim@acme.kr")).await,
            Err(WellspringError::Forbidden(_))
        ));
        assert!(matches!(
            register(&db, request("kim@elsewhere.kr")).await,
            Err(WellspringError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_inactive_user_cannot_login() {
        let db = Database::memory();
        let mut user = create_user(
            &db,
            CreateUserRequest {
                email: "c@center.kr".into(),
                password: "counsel2024".into(),
                name: "Choi".into(),
                role: Role::Counselor,
                company: None,
                department: None,
                phone: None,
            },
        )
        .await
        .unwrap();
        user.is_active = false;
        db.collection::<UserDoc>().replace(&mut user).await.unwrap();

        let result = login(
            &db,
            &JwtValidator::new_dev(),
            LoginRequest { email: "c@center.kr".into(), password: "counsel2024".into() },
            50_000,
        )
        .await;
        assert!(matches!(result, Err(WellspringError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_rate_update_permissions() {
        let db = Database::memory();
        let counselor = create_user(
            &db,
            CreateUserRequest {
                email: "c@center.kr".into(),
                password: "counsel2024".into(),
                name: "Choi".into(),
                role: Role::Counselor,
                company: None,
                department: None,
                phone: None,
            },
        )
        .await
        .unwrap();

        let stranger = Viewer::new("someone", Role::Counselor);
        assert!(matches!(
            update_counselor_rate(&db, &stranger, &counselor.id, RateUpdate::default()).await,
            Err(WellspringError::Forbidden(_))
        ));

        let admin = Viewer::new("root", Role::SuperAdmin);
        let updated = update_counselor_rate(
            &db,
            &admin,
            &counselor.id,
            RateUpdate {
                custom_rate: Some(70_000),
                use_system_rate: Some(false),
                chat_rate: Some(40_000),
                tax_rate: Some(TaxRate::Flat),
                ..RateUpdate::default()
            },
        )
        .await
        .unwrap();
        let profile = updated.counselor().unwrap();
        assert_eq!(profile.effective_rate(50_000), 70_000);
        assert_eq!(profile.method_rates.chat, Some(40_000));
        assert_eq!(profile.tax_rate, TaxRate::Flat);

        let negative = RateUpdate { custom_rate: Some(-1), ..RateUpdate::default() };
        assert!(matches!(
            update_counselor_rate(&db, &admin, &counselor.id, negative).await,
            Err(WellspringError::Validation(_))
        ));

        let huge = RateUpdate { face_to_face_rate: Some(MAX_SESSION_RATE + 1), ..RateUpdate::default() };
        match update_counselor_rate(&db, &admin, &counselor.id, huge).await {
            Err(WellspringError::Validation(errors)) => assert_eq!(errors[0].field, "faceToFaceRate"),
            other => panic!("expected validation error, got {other:?}"),
        }
        let ceiling = RateUpdate { custom_rate: Some(MAX_SESSION_RATE), ..RateUpdate::default() };
        assert!(update_counselor_rate(&db, &admin, &counselor.id, ceiling).await.is_ok());
    }
}
