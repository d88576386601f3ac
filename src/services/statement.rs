//! Localized (Korean) settlement statements
//!
//! Pure projection of a [`CounselorPaymentDoc`]; nothing here touches the
//! store.

use serde::Serialize;

use crate::db::schemas::{
    CounselorPaymentDoc, DeliveryMethod, PaymentMethod, PaymentStatus,
};
use crate::services::settlement::SETTLEMENT_TAX_PERCENT;

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatementLine {
    pub date: String,
    pub method: String,
    pub duration: String,
    pub rate: String,
    pub amount: String,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatementSummary {
    pub face_to_face: String,
    pub phone_video: String,
    pub chat: String,
    pub total_sessions: String,
    pub total_amount: String,
    pub tax_label: String,
    pub tax_amount: String,
    pub net_amount: String,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Statement {
    pub payment_id: String,
    pub counselor_id: String,
    pub counselor_name: String,
    pub period: String,
    pub status: PaymentStatus,
    pub status_label: String,
    pub items: Vec<StatementLine>,
    pub summary: StatementSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<String>,
}

pub fn period_label(year: i32, month: u32) -> String {
    format!("{year}년 {month}월")
}

pub fn method_label(method: DeliveryMethod) -> &'static str {
    match method {
        DeliveryMethod::FaceToFace => "대면 상담",
        DeliveryMethod::PhoneVideo => "전화/화상 상담",
        DeliveryMethod::Chat => "채팅 상담",
    }
}

pub fn status_label(status: PaymentStatus) -> &'static str {
    match status {
        PaymentStatus::Pending => "정산 대기",
        PaymentStatus::Approved => "승인 완료",
        PaymentStatus::Paid => "지급 완료",
        PaymentStatus::Dispute => "이의 제기",
        PaymentStatus::Processing => "처리 중",
        PaymentStatus::Settling => "정산 중",
        PaymentStatus::Completed => "정산 완료",
    }
}

pub fn payment_method_label(method: PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::BankTransfer => "계좌 이체",
        PaymentMethod::Check => "수표",
        PaymentMethod::DigitalWallet => "전자 지갑",
    }
}

/// `1234567` -> `1,234,567원`
pub fn format_won(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if amount < 0 { "-" } else { "" };
    format!("{sign}{grouped}원")
}

fn count_label(count: i64) -> String {
    format!("{count}건")
}

pub fn render(payment: &CounselorPaymentDoc, counselor_name: &str) -> Statement {
    let items = payment
        .sessions
        .iter()
        .map(|item| StatementLine {
            date: item.date.to_chrono().format("%Y.%m.%d").to_string(),
            method: method_label(item.method).to_string(),
            duration: format!("{}분", item.duration),
            rate: format_won(item.rate),
            amount: format_won(item.amount),
        })
        .collect();

    let s = &payment.summary;
    Statement {
        payment_id: payment.id.clone(),
        counselor_id: payment.counselor.clone(),
        counselor_name: counselor_name.to_string(),
        period: period_label(payment.year, payment.month),
        status: payment.status,
        status_label: status_label(payment.status).to_string(),
        items,
        summary: StatementSummary {
            face_to_face: count_label(s.face_to_face),
            phone_video: count_label(s.phone_video),
            chat: count_label(s.chat),
            total_sessions: count_label(s.total_sessions),
            total_amount: format_won(s.total_amount),
            tax_label: format!("원천징수세액 ({SETTLEMENT_TAX_PERCENT}%)"),
            tax_amount: format_won(s.tax_amount),
            net_amount: format_won(s.net_amount),
        },
        payment_method: payment
            .payment_method
            .map(|m| payment_method_label(m).to_string()),
        paid_at: payment
            .paid_at
            .map(|d| d.to_chrono().format("%Y.%m.%d").to_string()),
    }
}
