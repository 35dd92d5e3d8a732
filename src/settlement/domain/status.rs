//! 结算相关状态枚举
//!
//! 状态在库里以 snake_case 字符串落盘，代码里一律用封闭枚举做穷举匹配

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::AppError;

/// 订单支付状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// 待支付
    Pending,
    /// 支付成功
    Succeeded,
    /// 支付失败
    Failed,
    /// 已取消
    Cancelled,
    /// 已退款
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "succeeded" => Ok(PaymentStatus::Succeeded),
            "failed" => Ok(PaymentStatus::Failed),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(AppError::Validation(format!("未知支付状态: {}", other))),
        }
    }
}

/// 资金托管状态
///
/// 只允许沿 pending → held → released_partial → released_full 正向推进，
/// refunded 是唯一可以从非终态直接进入的终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    /// 待托管
    Pending,
    /// 资金已托管
    Held,
    /// 已部分放款
    ReleasedPartial,
    /// 已全额放款
    ReleasedFull,
    /// 已退款关闭
    Refunded,
}

impl EscrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowStatus::Pending => "pending",
            EscrowStatus::Held => "held",
            EscrowStatus::ReleasedPartial => "released_partial",
            EscrowStatus::ReleasedFull => "released_full",
            EscrowStatus::Refunded => "refunded",
        }
    }

    /// 终态（不可再被任何操作改变）
    pub fn is_terminal(&self) -> bool {
        matches!(self, EscrowStatus::ReleasedFull | EscrowStatus::Refunded)
    }

    /// 状态机上的推进序号
    fn rank(&self) -> u8 {
        match self {
            EscrowStatus::Pending => 0,
            EscrowStatus::Held => 1,
            EscrowStatus::ReleasedPartial => 2,
            EscrowStatus::ReleasedFull => 3,
            EscrowStatus::Refunded => 4,
        }
    }

    /// 是否允许推进到目标状态
    pub fn can_advance_to(&self, next: EscrowStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            // 退款可从任意非终态进入
            EscrowStatus::Refunded => true,
            _ => next.rank() > self.rank(),
        }
    }
}

impl FromStr for EscrowStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EscrowStatus::Pending),
            "held" => Ok(EscrowStatus::Held),
            "released_partial" => Ok(EscrowStatus::ReleasedPartial),
            "released_full" => Ok(EscrowStatus::ReleasedFull),
            "refunded" => Ok(EscrowStatus::Refunded),
            other => Err(AppError::Validation(format!("未知托管状态: {}", other))),
        }
    }
}

/// 支付流水状态（镜像网关 intent 生命周期）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// 已创建，等待支付方式/确认
    Pending,
    /// 需要客人补充验证
    RequiresAction,
    /// 已授权，等待扣款
    RequiresCapture,
    /// 网关处理中
    Processing,
    /// 支付成功
    Succeeded,
    /// 支付失败
    Failed,
    /// 已取消
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::RequiresAction => "requires_action",
            TransactionStatus::RequiresCapture => "requires_capture",
            TransactionStatus::Processing => "processing",
            TransactionStatus::Succeeded => "succeeded",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }

    /// 网关状态字符串 → 内部状态
    ///
    /// 未识别的状态按 Pending 处理，原文在 raw_status 里保留
    pub fn from_gateway(raw: &str) -> Self {
        match raw {
            "requires_payment_method" | "requires_confirmation" | "created" => {
                TransactionStatus::Pending
            }
            "requires_action" => TransactionStatus::RequiresAction,
            "requires_capture" => TransactionStatus::RequiresCapture,
            "processing" => TransactionStatus::Processing,
            "succeeded" => TransactionStatus::Succeeded,
            "payment_failed" | "failed" => TransactionStatus::Failed,
            "canceled" | "cancelled" => TransactionStatus::Cancelled,
            _ => TransactionStatus::Pending,
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "requires_action" => Ok(TransactionStatus::RequiresAction),
            "requires_capture" => Ok(TransactionStatus::RequiresCapture),
            "processing" => Ok(TransactionStatus::Processing),
            "succeeded" => Ok(TransactionStatus::Succeeded),
            "failed" => Ok(TransactionStatus::Failed),
            "cancelled" => Ok(TransactionStatus::Cancelled),
            other => Err(AppError::Validation(format!("未知流水状态: {}", other))),
        }
    }
}

/// 佣金记录状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionStatus {
    /// 待审批
    Pending,
    /// 已审批
    Approved,
    /// 已支付
    Paid,
    /// 已作废
    Cancelled,
    /// 争议中
    Disputed,
}

impl CommissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionStatus::Pending => "pending",
            CommissionStatus::Approved => "approved",
            CommissionStatus::Paid => "paid",
            CommissionStatus::Cancelled => "cancelled",
            CommissionStatus::Disputed => "disputed",
        }
    }
}

impl FromStr for CommissionStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CommissionStatus::Pending),
            "approved" => Ok(CommissionStatus::Approved),
            "paid" => Ok(CommissionStatus::Paid),
            "cancelled" => Ok(CommissionStatus::Cancelled),
            "disputed" => Ok(CommissionStatus::Disputed),
            other => Err(AppError::Validation(format!("未知佣金状态: {}", other))),
        }
    }
}

/// 订单生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// 待确认
    Pending,
    /// 商家已确认
    Confirmed,
    /// 已完成
    Complete,
    /// 已取消
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Complete => "complete",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// 订单是否还在进行中（可确认/可取消）
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

impl FromStr for BookingStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "complete" => Ok(BookingStatus::Complete),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(AppError::Validation(format!("未知订单状态: {}", other))),
        }
    }
}

/// 产品形态，决定自动确认窗口
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductKind {
    /// 一日游/短途
    DayTrip,
    /// 多日游
    MultiDay,
}

impl ProductKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductKind::DayTrip => "day_trip",
            ProductKind::MultiDay => "multi_day",
        }
    }
}

impl FromStr for ProductKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day_trip" => Ok(ProductKind::DayTrip),
            "multi_day" => Ok(ProductKind::MultiDay),
            other => Err(AppError::Validation(format!("未知产品形态: {}", other))),
        }
    }
}

/// 商家打款节奏
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutCadence {
    /// 周结（纳入周打款批处理）
    Weekly,
    /// 手动（只接受管理端触发）
    Manual,
}

impl PayoutCadence {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutCadence::Weekly => "weekly",
            PayoutCadence::Manual => "manual",
        }
    }
}

impl FromStr for PayoutCadence {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weekly" => Ok(PayoutCadence::Weekly),
            "manual" => Ok(PayoutCadence::Manual),
            other => Err(AppError::Validation(format!("未知打款节奏: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escrow_forward_only() {
        assert!(EscrowStatus::Pending.can_advance_to(EscrowStatus::Held));
        assert!(EscrowStatus::Held.can_advance_to(EscrowStatus::ReleasedPartial));
        assert!(EscrowStatus::Held.can_advance_to(EscrowStatus::ReleasedFull));
        assert!(EscrowStatus::ReleasedPartial.can_advance_to(EscrowStatus::ReleasedFull));

        assert!(!EscrowStatus::Held.can_advance_to(EscrowStatus::Pending));
        assert!(!EscrowStatus::ReleasedPartial.can_advance_to(EscrowStatus::Held));
    }

    #[test]
    fn test_escrow_refunded_override() {
        assert!(EscrowStatus::Pending.can_advance_to(EscrowStatus::Refunded));
        assert!(EscrowStatus::Held.can_advance_to(EscrowStatus::Refunded));
        assert!(EscrowStatus::ReleasedPartial.can_advance_to(EscrowStatus::Refunded));
    }

    #[test]
    fn test_escrow_terminal_states() {
        for next in [
            EscrowStatus::Pending,
            EscrowStatus::Held,
            EscrowStatus::ReleasedPartial,
            EscrowStatus::ReleasedFull,
            EscrowStatus::Refunded,
        ] {
            assert!(!EscrowStatus::ReleasedFull.can_advance_to(next));
            assert!(!EscrowStatus::Refunded.can_advance_to(next));
        }
    }

    #[test]
    fn test_gateway_status_mapping() {
        assert_eq!(
            TransactionStatus::from_gateway("requires_capture"),
            TransactionStatus::RequiresCapture
        );
        assert_eq!(
            TransactionStatus::from_gateway("succeeded"),
            TransactionStatus::Succeeded
        );
        assert_eq!(
            TransactionStatus::from_gateway("canceled"),
            TransactionStatus::Cancelled
        );
        // 陌生状态不炸，按待支付处理
        assert_eq!(
            TransactionStatus::from_gateway("whatever_new"),
            TransactionStatus::Pending
        );
    }

    #[test]
    fn test_round_trip_db_strings() {
        for s in [
            EscrowStatus::Pending,
            EscrowStatus::Held,
            EscrowStatus::ReleasedPartial,
            EscrowStatus::ReleasedFull,
            EscrowStatus::Refunded,
        ] {
            assert_eq!(s.as_str().parse::<EscrowStatus>().unwrap(), s);
        }
    }
}
