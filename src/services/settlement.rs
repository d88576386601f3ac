//! Counselor settlement and dispute workflow
//!
//! Generation aggregates a month of completed, unpaid sessions into one
//! pending [`CounselorPaymentDoc`] per counselor. The payment record is
//! inserted before its sessions are marked paid: the unique
//! (counselor, year, month) index decides between concurrent runs, and the
//! losing run marks nothing. Sessions are marked with a conditional filter
//! on `is_paid_to_counselor = false`, so no session is settled twice.

use bson::Bson;
use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::auth::Role;
use crate::db::schemas::{
    to_chrono, CounselingSessionDoc, CounselorPaymentDoc, DeliveryMethod, NotificationDoc,
    NotificationKind, PaymentLineItem, PaymentMethod, PaymentStatus, PaymentSummary,
    SessionStatus, StatusLogEntry, TaxRate, UserDoc,
};
use crate::db::{filter::stored, Database, Filter, Update};
use crate::services::notifications::{notify_quietly, NotificationSink};
use crate::services::statement::{self, Statement};
use crate::services::visibility::Viewer;
use crate::types::{FieldError, Result, WellspringError};

/// Fixed withholding applied to generated statements
pub const SETTLEMENT_TAX_PERCENT: i64 = 10;

pub const MIN_YEAR: i32 = 2000;
pub const MAX_YEAR: i32 = 2100;

pub fn validate_period(year: i32, month: u32) -> Result<()> {
    let mut errors = Vec::new();
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        errors.push(FieldError::new(
            "year",
            format!("must be between {MIN_YEAR} and {MAX_YEAR}"),
        ));
    }
    if !(1..=12).contains(&month) {
        errors.push(FieldError::new("month", "must be between 1 and 12"));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(WellspringError::Validation(errors))
    }
}

/// First and last millisecond of the month, UTC
pub fn month_bounds(year: i32, month: u32) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    validate_period(year, month)?;
    let start = Utc
        .with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| WellspringError::invalid("month", "invalid period"))?;
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let next = Utc
        .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| WellspringError::invalid("month", "invalid period"))?;
    Ok((start, next - chrono::Duration::milliseconds(1)))
}

/// Line items and summary for one counselor's sessions
pub fn build_statement(
    sessions: &[CounselingSessionDoc],
) -> Result<(Vec<PaymentLineItem>, PaymentSummary)> {
    let mut summary = PaymentSummary::default();
    let items: Vec<PaymentLineItem> = sessions
        .iter()
        .map(|s| {
            match s.delivery_method {
                DeliveryMethod::FaceToFace => summary.face_to_face += 1,
                DeliveryMethod::PhoneVideo => summary.phone_video += 1,
                DeliveryMethod::Chat => summary.chat += 1,
            }
            PaymentLineItem {
                session: s.id.clone(),
                date: s.appointment_date,
                method: s.delivery_method,
                duration: s.duration,
                rate: s.counselor_rate,
                amount: s.counselor_rate,
            }
        })
        .collect();

    summary.total_sessions = items.len() as i64;
    summary.total_amount = items
        .iter()
        .try_fold(0_i64, |acc, i| acc.checked_add(i.amount))
        .ok_or_else(|| {
            WellspringError::invalid("counselorRate", "settlement total exceeds the supported range")
        })?;
    summary.tax_amount = settlement_tax(summary.total_amount);
    summary.net_amount = summary.total_amount - summary.tax_amount;
    Ok((items, summary))
}

/// `floor(total * 10 / 100)`, widened so no `i64` total overflows
pub fn settlement_tax(total: i64) -> i64 {
    let tax = (i128::from(total) * i128::from(SETTLEMENT_TAX_PERCENT)).div_euclid(100);
    // |tax| <= |total| / 10
    tax as i64
}

#[derive(Debug, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateOutcome {
    /// Statements created by this run
    pub created: usize,
    /// Counselors skipped because a statement already exists
    pub skipped: usize,
    pub payment_ids: Vec<String>,
}

/// Create pending statements for `(year, month)`
pub async fn generate(
    db: &Database,
    year: i32,
    month: u32,
    counselor_id: Option<&str>,
) -> Result<GenerateOutcome> {
    let (start, end) = month_bounds(year, month)?;
    let sessions = db.collection::<CounselingSessionDoc>();
    let payments = db.collection::<CounselorPaymentDoc>();

    let mut filter = Filter::new()
        .eq("status", stored(&SessionStatus::Completed))
        .gte("appointment_date", bson::DateTime::from_chrono(start))
        .lte("appointment_date", bson::DateTime::from_chrono(end))
        .eq("is_paid_to_counselor", false)
        .ne("counselor", Bson::Null);
    if let Some(id) = counselor_id {
        filter = filter.eq("counselor", id);
    }

    let mut by_counselor: BTreeMap<String, Vec<CounselingSessionDoc>> = BTreeMap::new();
    for session in sessions.find_many(filter).await? {
        if let Some(counselor) = session.counselor.clone() {
            by_counselor.entry(counselor).or_default().push(session);
        }
    }

    let mut outcome = GenerateOutcome::default();
    for (counselor, group) in by_counselor {
        let existing = payments
            .count(
                Filter::new()
                    .eq("counselor", counselor.as_str())
                    .eq("year", year)
                    .eq("month", i64::from(month)),
            )
            .await?;
        if existing > 0 {
            outcome.skipped += 1;
            continue;
        }

        let (items, summary) = build_statement(&group)?;
        let total = summary.total_amount;
        let payment = CounselorPaymentDoc::new(counselor.clone(), year, month, items, summary);
        let payment_id = match payments.insert_one(payment).await {
            Ok(id) => id,
            Err(WellspringError::Conflict(_)) => {
                warn!(counselor = %counselor, year, month, "statement created concurrently, skipping");
                outcome.skipped += 1;
                continue;
            }
            Err(e) => return Err(e),
        };

        let ids: Vec<&str> = group.iter().map(|s| s.id.as_str()).collect();
        let marked = sessions
            .update_many(
                Filter::new()
                    .is_in("_id", ids.iter().copied())
                    .eq("is_paid_to_counselor", false),
                Update::new().set("is_paid_to_counselor", true),
            )
            .await?;

        info!(
            counselor = %counselor,
            payment_id = %payment_id,
            sessions = group.len(),
            marked,
            total,
            "settlement statement generated"
        );
        outcome.created += 1;
        outcome.payment_ids.push(payment_id);
    }

    Ok(outcome)
}

fn ensure_settlement_role(viewer: &Viewer) -> Result<()> {
    match viewer.role {
        Role::Counselor | Role::SuperAdmin => Ok(()),
        _ => Err(WellspringError::Forbidden(
            "Settlement records are only available to counselors and super-admins".into(),
        )),
    }
}

fn ensure_can_see(viewer: &Viewer, payment: &CounselorPaymentDoc) -> Result<()> {
    ensure_settlement_role(viewer)?;
    if viewer.role == Role::Counselor && payment.counselor != viewer.id {
        return Err(WellspringError::Forbidden(
            "Counselors may only access their own settlements".into(),
        ));
    }
    Ok(())
}

async fn load(db: &Database, id: &str) -> Result<CounselorPaymentDoc> {
    db.collection::<CounselorPaymentDoc>()
        .find_by_id(id)
        .await?
        .ok_or_else(|| WellspringError::NotFound("Payment".into()))
}

/// Persist a transition only if nobody else moved the record meanwhile
async fn save_transition(db: &Database, payment: &mut CounselorPaymentDoc, from: PaymentStatus) -> Result<()> {
    let saved = db
        .collection::<CounselorPaymentDoc>()
        .replace_if(payment, Filter::new().eq("status", from.as_str()))
        .await?;
    if saved {
        Ok(())
    } else {
        Err(WellspringError::Conflict(
            "Payment was modified concurrently, reload and retry".into(),
        ))
    }
}

#[derive(Debug, Default, Clone)]
pub struct PaymentQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub status: Option<PaymentStatus>,
    pub counselor: Option<String>,
}

pub async fn list(db: &Database, viewer: &Viewer, query: &PaymentQuery) -> Result<Vec<CounselorPaymentDoc>> {
    ensure_settlement_role(viewer)?;
    let mut filter = Filter::new();
    if viewer.role == Role::Counselor {
        filter = filter.eq("counselor", viewer.id.as_str());
    } else if let Some(counselor) = &query.counselor {
        filter = filter.eq("counselor", counselor.as_str());
    }
    if let Some(year) = query.year {
        filter = filter.eq("year", year);
    }
    if let Some(month) = query.month {
        filter = filter.eq("month", i64::from(month));
    }
    if let Some(status) = query.status {
        filter = filter.eq("status", status.as_str());
    }
    let mut payments = db.collection::<CounselorPaymentDoc>().find_many(filter).await?;
    payments.sort_by(|a, b| (b.year, b.month).cmp(&(a.year, a.month)));
    Ok(payments)
}

pub async fn get(db: &Database, viewer: &Viewer, id: &str) -> Result<CounselorPaymentDoc> {
    let payment = load(db, id).await?;
    ensure_can_see(viewer, &payment)?;
    Ok(payment)
}

pub async fn statement(db: &Database, viewer: &Viewer, id: &str) -> Result<Statement> {
    let payment = get(db, viewer, id).await?;
    let name = db
        .collection::<UserDoc>()
        .find_by_id(&payment.counselor)
        .await?
        .map(|u| u.name)
        .unwrap_or_default();
    Ok(statement::render(&payment, &name))
}

pub async fn approve(
    db: &Database,
    sink: &dyn NotificationSink,
    id: &str,
    admin_id: &str,
) -> Result<CounselorPaymentDoc> {
    let mut payment = load(db, id).await?;
    let from = payment.status;
    payment.approve(admin_id)?;
    save_transition(db, &mut payment, from).await?;

    info!(payment_id = %id, admin = %admin_id, "settlement approved");
    notify_quietly(
        sink,
        NotificationDoc::new(
            &payment.counselor,
            NotificationKind::PaymentApproved,
            "Settlement approved",
            &format!(
                "Your settlement for {} has been approved.",
                statement::period_label(payment.year, payment.month)
            ),
        )
        .about(id),
    )
    .await;
    Ok(payment)
}

pub async fn pay(
    db: &Database,
    sink: &dyn NotificationSink,
    id: &str,
    method: PaymentMethod,
    notes: Option<&str>,
    admin_id: &str,
) -> Result<CounselorPaymentDoc> {
    let mut payment = load(db, id).await?;
    let from = payment.status;
    payment.pay(method, notes, admin_id)?;
    save_transition(db, &mut payment, from).await?;

    info!(payment_id = %id, admin = %admin_id, method = ?method, "settlement paid");
    notify_quietly(
        sink,
        NotificationDoc::new(
            &payment.counselor,
            NotificationKind::PaymentPaid,
            "Settlement paid",
            &format!(
                "{} has been paid for {}.",
                statement::format_won(payment.summary.net_amount),
                statement::period_label(payment.year, payment.month)
            ),
        )
        .about(id),
    )
    .await;
    Ok(payment)
}

pub async fn dispute(
    db: &Database,
    sink: &dyn NotificationSink,
    viewer: &Viewer,
    id: &str,
    reason: &str,
) -> Result<CounselorPaymentDoc> {
    let mut payment = load(db, id).await?;
    ensure_can_see(viewer, &payment)?;
    let from = payment.status;
    payment.dispute(reason, &viewer.id)?;
    save_transition(db, &mut payment, from).await?;

    info!(payment_id = %id, by = %viewer.id, "settlement disputed");
    let admins = db
        .collection::<UserDoc>()
        .find_many(
            Filter::new()
                .eq("role", Role::SuperAdmin.as_str())
                .eq("is_active", true),
        )
        .await?;
    for admin in admins {
        notify_quietly(
            sink,
            NotificationDoc::new(
                &admin.id,
                NotificationKind::PaymentDisputed,
                "Settlement disputed",
                reason.trim(),
            )
            .about(id),
        )
        .await;
    }
    Ok(payment)
}

/// Administrative override
pub async fn set_status(
    db: &Database,
    id: &str,
    to: PaymentStatus,
    admin_id: &str,
    note: Option<String>,
) -> Result<CounselorPaymentDoc> {
    let mut payment = load(db, id).await?;
    let from = payment.status;
    payment.override_status(to, admin_id, note)?;
    save_transition(db, &mut payment, from).await?;

    info!(payment_id = %id, admin = %admin_id, from = from.as_str(), to = to.as_str(), "settlement status overridden");
    Ok(payment)
}

/// Ad-hoc month summary computed with the counselor's own tax rate
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PersonalSummary {
    pub counselor: String,
    pub year: i32,
    pub month: u32,
    pub period: String,
    pub face_to_face: i64,
    pub phone_video: i64,
    pub chat: i64,
    pub total_sessions: i64,
    pub settled_sessions: i64,
    pub total_amount: i64,
    pub tax_rate: f64,
    pub tax_amount: i64,
    pub net_amount: i64,
}

pub async fn personal_summary(
    db: &Database,
    counselor_id: &str,
    year: i32,
    month: u32,
) -> Result<PersonalSummary> {
    let (start, end) = month_bounds(year, month)?;
    let tax_rate = db
        .collection::<UserDoc>()
        .find_by_id(counselor_id)
        .await?
        .and_then(|u| u.counselor().map(|p| p.tax_rate))
        .ok_or_else(|| WellspringError::NotFound("Counselor".into()))?;

    let sessions = db
        .collection::<CounselingSessionDoc>()
        .find_many(
            Filter::new()
                .eq("counselor", counselor_id)
                .eq("status", stored(&SessionStatus::Completed))
                .gte("appointment_date", bson::DateTime::from_chrono(start))
                .lte("appointment_date", bson::DateTime::from_chrono(end)),
        )
        .await?;

    let (_, summary) = build_statement(&sessions)?;
    Ok(summarize_with_rate(counselor_id, year, month, &sessions, &summary, tax_rate))
}

fn summarize_with_rate(
    counselor_id: &str,
    year: i32,
    month: u32,
    sessions: &[CounselingSessionDoc],
    summary: &PaymentSummary,
    tax_rate: TaxRate,
) -> PersonalSummary {
    let tax_amount = tax_rate.withholding(summary.total_amount);
    PersonalSummary {
        counselor: counselor_id.to_string(),
        year,
        month,
        period: statement::period_label(year, month),
        face_to_face: summary.face_to_face,
        phone_video: summary.phone_video,
        chat: summary.chat,
        total_sessions: summary.total_sessions,
        settled_sessions: sessions.iter().filter(|s| s.is_paid_to_counselor).count() as i64,
        total_amount: summary.total_amount,
        tax_rate: tax_rate.percent(),
        tax_amount,
        net_amount: summary.total_amount - tax_amount,
    }
}

/// Platform-wide totals of the statements for one period
#[derive(Debug, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PeriodSummary {
    pub year: i32,
    pub month: u32,
    pub period: String,
    pub statements: usize,
    pub by_status: BTreeMap<String, usize>,
    pub total_amount: i64,
    pub tax_amount: i64,
    pub net_amount: i64,
}

pub async fn period_summary(db: &Database, year: i32, month: u32) -> Result<PeriodSummary> {
    validate_period(year, month)?;
    let payments = db
        .collection::<CounselorPaymentDoc>()
        .find_many(Filter::new().eq("year", year).eq("month", i64::from(month)))
        .await?;

    let mut summary = PeriodSummary {
        year,
        month,
        period: statement::period_label(year, month),
        statements: payments.len(),
        ..PeriodSummary::default()
    };
    for p in &payments {
        *summary.by_status.entry(p.status.as_str().to_string()).or_default() += 1;
        summary.total_amount += p.summary.total_amount;
        summary.tax_amount += p.summary.tax_amount;
        summary.net_amount += p.summary.net_amount;
    }
    Ok(summary)
}

/// Current (year, month) in UTC
pub fn current_period() -> (i32, u32) {
    let now = Utc::now();
    (now.year(), now.month())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemView {
    pub session: String,
    pub date: DateTime<Utc>,
    pub method: DeliveryMethod,
    pub duration: i32,
    pub rate: i64,
    pub amount: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryView {
    pub face_to_face: i64,
    pub phone_video: i64,
    pub chat: i64,
    pub total_sessions: i64,
    pub total_amount: i64,
    pub tax_amount: i64,
    pub net_amount: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusLogView {
    pub by: String,
    pub from: PaymentStatus,
    pub to: PaymentStatus,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl From<&StatusLogEntry> for StatusLogView {
    fn from(e: &StatusLogEntry) -> Self {
        Self {
            by: e.by.clone(),
            from: e.from,
            to: e.to,
            at: to_chrono(e.at),
            note: e.note.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView {
    pub id: String,
    pub counselor: String,
    pub year: i32,
    pub month: u32,
    pub sessions: Vec<LineItemView>,
    pub summary: SummaryView,
    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<PaymentMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    pub notes: String,
    pub status_log: Vec<StatusLogView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&CounselorPaymentDoc> for PaymentView {
    fn from(p: &CounselorPaymentDoc) -> Self {
        let s = &p.summary;
        Self {
            id: p.id.clone(),
            counselor: p.counselor.clone(),
            year: p.year,
            month: p.month,
            sessions: p
                .sessions
                .iter()
                .map(|i| LineItemView {
                    session: i.session.clone(),
                    date: to_chrono(i.date),
                    method: i.method,
                    duration: i.duration,
                    rate: i.rate,
                    amount: i.amount,
                })
                .collect(),
            summary: SummaryView {
                face_to_face: s.face_to_face,
                phone_video: s.phone_video,
                chat: s.chat,
                total_sessions: s.total_sessions,
                total_amount: s.total_amount,
                tax_amount: s.tax_amount,
                net_amount: s.net_amount,
            },
            status: p.status,
            payment_method: p.payment_method,
            approved_by: p.approved_by.clone(),
            approved_at: p.approved_at.map(to_chrono),
            paid_at: p.paid_at.map(to_chrono),
            notes: p.notes.clone(),
            status_log: p.status_log.iter().map(StatusLogView::from).collect(),
            created_at: p.metadata.created(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::notifications::StoreNotifier;

    fn completed(counselor: &str, rate: i64, day: u32, method: DeliveryMethod) -> CounselingSessionDoc {
        let date = Utc.with_ymd_and_hms(2024, 11, day, 9, 0, 0).unwrap();
        let mut session = CounselingSessionDoc::new(
            "emp".into(),
            None,
            "topic".into(),
            method,
            bson::DateTime::from_chrono(date),
        );
        session.assign(counselor, rate);
        session.status = SessionStatus::Completed;
        session
    }

    async fn seed(db: &Database, sessions: Vec<CounselingSessionDoc>) {
        let collection = db.collection::<CounselingSessionDoc>();
        for s in sessions {
            collection.insert_one(s).await.unwrap();
        }
    }

    #[test]
    fn test_tax_arithmetic() {
        assert_eq!(settlement_tax(180_000), 18_000);
        assert_eq!(settlement_tax(55_555), 5_555);
        assert_eq!(settlement_tax(9), 0);
        for total in [0_i64, 1, 99, 50_000, 123_457] {
            let tax = settlement_tax(total);
            assert_eq!(tax, total * 10 / 100);
            assert_eq!(total - tax + tax, total);
        }
    }

    #[test]
    fn test_tax_at_i64_extremes() {
        assert_eq!(settlement_tax(i64::MAX), i64::MAX / 10);
        assert_eq!(TaxRate::Flat.withholding(i64::MAX), i64::MAX / 10);
        assert_eq!(TaxRate::Business.withholding(1_000_000), 33_000);
    }

    #[tokio::test]
    async fn test_overflowing_total_is_rejected() {
        let db = Database::memory();
        seed(
            &db,
            vec![
                completed("x", i64::MAX / 2, 3, DeliveryMethod::Chat),
                completed("x", i64::MAX / 2, 4, DeliveryMethod::Chat),
                completed("x", i64::MAX / 2, 5, DeliveryMethod::Chat),
            ],
        )
        .await;

        assert!(matches!(
            generate(&db, 2024, 11, None).await,
            Err(WellspringError::Validation(_))
        ));
        // nothing was written and nothing was marked
        let payments = db.collection::<CounselorPaymentDoc>().count(Filter::new()).await.unwrap();
        assert_eq!(payments, 0);
        let unpaid = db
            .collection::<CounselingSessionDoc>()
            .count(Filter::new().eq("is_paid_to_counselor", false))
            .await
            .unwrap();
        assert_eq!(unpaid, 3);
    }

    #[tokio::test]
    async fn test_undecodable_session_fails_generation() {
        let db = Database::memory();
        seed(
            &db,
            vec![
                completed("x", 50_000, 3, DeliveryMethod::Chat),
                completed("x", 60_000, 4, DeliveryMethod::Chat),
            ],
        )
        .await;
        let sessions = db.collection::<CounselingSessionDoc>();
        let first = sessions.find_many(Filter::new()).await.unwrap()[0].id.clone();
        sessions
            .update_many(Filter::by_id(&first), Update::new().set("counselor_rate", "fifty thousand"))
            .await
            .unwrap();

        // a short statement is worse than none
        assert!(matches!(
            generate(&db, 2024, 11, None).await,
            Err(WellspringError::Database(_))
        ));
        let payments = db.collection::<CounselorPaymentDoc>().count(Filter::new()).await.unwrap();
        assert_eq!(payments, 0);
    }

    #[tokio::test]
    async fn test_large_rate_settles_without_overflow() {
        let db = Database::memory();
        seed(&db, vec![completed("x", i64::MAX / 5, 3, DeliveryMethod::Chat)]).await;

        let outcome = generate(&db, 2024, 11, None).await.unwrap();
        assert_eq!(outcome.created, 1);
        let payment = db
            .collection::<CounselorPaymentDoc>()
            .find_one(Filter::new().eq("counselor", "x"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payment.summary.tax_amount, (i64::MAX / 5) / 10);
        assert_eq!(
            payment.summary.net_amount + payment.summary.tax_amount,
            payment.summary.total_amount
        );
    }

    #[test]
    fn test_month_bounds_inclusive_end() {
        let (start, end) = month_bounds(2024, 2).unwrap();
        assert_eq!(start.to_rfc3339(), "2024-02-01T00:00:00+00:00");
        assert_eq!(end.timestamp_millis() + 1, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap().timestamp_millis());
        let (_, dec_end) = month_bounds(2024, 12).unwrap();
        assert_eq!(dec_end.year(), 2024);
        assert!(month_bounds(1999, 1).is_err());
        assert!(month_bounds(2024, 13).is_err());
        assert!(month_bounds(2024, 0).is_err());
    }

    #[tokio::test]
    async fn test_generate_groups_and_marks_paid() {
        let db = Database::memory();
        seed(
            &db,
            vec![
                completed("x", 50_000, 3, DeliveryMethod::FaceToFace),
                completed("x", 60_000, 10, DeliveryMethod::PhoneVideo),
                completed("x", 70_000, 30, DeliveryMethod::Chat),
                completed("y", 40_000, 15, DeliveryMethod::Chat),
            ],
        )
        .await;

        let outcome = generate(&db, 2024, 11, None).await.unwrap();
        assert_eq!(outcome.created, 2);

        let payments = db.collection::<CounselorPaymentDoc>();
        let x = payments
            .find_one(Filter::new().eq("counselor", "x"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(x.summary.total_amount, 180_000);
        assert_eq!(x.summary.tax_amount, 18_000);
        assert_eq!(x.summary.net_amount, 162_000);
        assert_eq!(x.summary.face_to_face, 1);
        assert_eq!(x.summary.phone_video, 1);
        assert_eq!(x.summary.chat, 1);
        assert_eq!(x.status, PaymentStatus::Pending);

        let unpaid = db
            .collection::<CounselingSessionDoc>()
            .count(Filter::new().eq("is_paid_to_counselor", false))
            .await
            .unwrap();
        assert_eq!(unpaid, 0);

        let again = generate(&db, 2024, 11, None).await.unwrap();
        assert_eq!(again.created, 0);
    }

    #[tokio::test]
    async fn test_generate_excludes_out_of_scope_sessions() {
        let db = Database::memory();
        let mut cancelled = completed("x", 50_000, 5, DeliveryMethod::Chat);
        cancelled.status = SessionStatus::Cancelled;
        let mut paid = completed("x", 50_000, 6, DeliveryMethod::Chat);
        paid.is_paid_to_counselor = true;
        let mut unassigned = completed("x", 50_000, 7, DeliveryMethod::Chat);
        unassigned.counselor = None;
        let mut october = completed("x", 50_000, 1, DeliveryMethod::Chat);
        october.appointment_date =
            bson::DateTime::from_chrono(Utc.with_ymd_and_hms(2024, 10, 31, 23, 59, 59).unwrap());
        let mut last_ms = completed("x", 30_000, 1, DeliveryMethod::Chat);
        let (_, end) = month_bounds(2024, 11).unwrap();
        last_ms.appointment_date = bson::DateTime::from_chrono(end);
        seed(&db, vec![cancelled, paid, unassigned, october, last_ms]).await;

        let outcome = generate(&db, 2024, 11, None).await.unwrap();
        assert_eq!(outcome.created, 1);
        let payment = db
            .collection::<CounselorPaymentDoc>()
            .find_by_id(&outcome.payment_ids[0])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payment.summary.total_sessions, 1);
        assert_eq!(payment.summary.total_amount, 30_000);
    }

    #[tokio::test]
    async fn test_existing_statement_skips_counselor_without_merge() {
        let db = Database::memory();
        db.collection::<CounselorPaymentDoc>()
            .insert_one(CounselorPaymentDoc::new("x".into(), 2024, 11, Vec::new(), PaymentSummary::default()))
            .await
            .unwrap();
        seed(&db, vec![completed("x", 50_000, 3, DeliveryMethod::Chat)]).await;

        let outcome = generate(&db, 2024, 11, Some("x")).await.unwrap();
        assert_eq!(outcome.created, 0);
        assert_eq!(outcome.skipped, 1);
        let still_unpaid = db
            .collection::<CounselingSessionDoc>()
            .count(Filter::new().eq("is_paid_to_counselor", false))
            .await
            .unwrap();
        assert_eq!(still_unpaid, 1);
    }

    #[tokio::test]
    async fn test_counselor_cannot_touch_others_statement() {
        let db = Database::memory();
        let sink = StoreNotifier::new(db.clone());
        let payment = CounselorPaymentDoc::new("x".into(), 2024, 11, Vec::new(), PaymentSummary::default());
        let id = db.collection::<CounselorPaymentDoc>().insert_one(payment).await.unwrap();

        let other = Viewer::new("y", Role::Counselor);
        assert!(matches!(get(&db, &other, &id).await, Err(WellspringError::Forbidden(_))));
        assert!(matches!(
            dispute(&db, &sink, &other, &id, "not mine").await,
            Err(WellspringError::Forbidden(_))
        ));
        assert!(matches!(
            get(&db, &Viewer::new("m", Role::CompanyAdmin), &id).await,
            Err(WellspringError::Forbidden(_))
        ));
        assert!(list(&db, &other, &PaymentQuery::default()).await.unwrap().is_empty());

        let owner = Viewer::new("x", Role::Counselor);
        let disputed = dispute(&db, &sink, &owner, &id, "missing a session").await.unwrap();
        assert_eq!(disputed.status, PaymentStatus::Dispute);
    }

    #[tokio::test]
    async fn test_personal_summary_uses_own_tax_rate() {
        let db = Database::memory();
        let mut counselor = UserDoc::new(
            "x@center.kr",
            "hash".into(),
            "X",
            crate::db::schemas::RoleProfile::Counselor(Default::default()),
        )
        .unwrap();
        let counselor_id = counselor.id.clone();
        counselor.counselor_mut().unwrap().tax_rate = TaxRate::Business;
        db.collection::<UserDoc>().insert_one(counselor).await.unwrap();
        seed(
            &db,
            vec![
                completed(&counselor_id, 100_000, 4, DeliveryMethod::FaceToFace),
                completed(&counselor_id, 80_000, 5, DeliveryMethod::Chat),
            ],
        )
        .await;

        let summary = personal_summary(&db, &counselor_id, 2024, 11).await.unwrap();
        assert_eq!(summary.total_amount, 180_000);
        assert_eq!(summary.tax_amount, 5_940);
        assert_eq!(summary.net_amount, 174_060);
        assert_eq!(summary.settled_sessions, 0);
    }
}
