//! Budget entity - calibration/maintenance service costs per equipment batch

use chrono::NaiveDate;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::identity::RecordPrefix;

/// Service being quoted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ServiceType {
    #[default]
    #[serde(rename = "Calibração")]
    Calibration,
    #[serde(rename = "Manutenção")]
    Maintenance,
    #[serde(rename = "Reparo")]
    Repair,
    #[serde(rename = "Peças")]
    Parts,
}

impl std::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceType::Calibration => write!(f, "Calibração"),
            ServiceType::Maintenance => write!(f, "Manutenção"),
            ServiceType::Repair => write!(f, "Reparo"),
            ServiceType::Parts => write!(f, "Peças"),
        }
    }
}

impl std::str::FromStr for ServiceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "calibração" | "calibracao" | "calibration" => Ok(ServiceType::Calibration),
            "manutenção" | "manutencao" | "maintenance" => Ok(ServiceType::Maintenance),
            "reparo" | "repair" => Ok(ServiceType::Repair),
            "peças" | "pecas" | "parts" => Ok(ServiceType::Parts),
            _ => Err(format!("Unknown service type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BudgetStatus {
    #[default]
    #[serde(rename = "Pendente")]
    Pending,
    #[serde(rename = "Aprovado")]
    Approved,
    #[serde(rename = "Concluído")]
    Completed,
    #[serde(rename = "Cancelado")]
    Cancelled,
}

impl BudgetStatus {
    /// Whether this status counts towards realized (spent) cost as
    /// opposed to pending cost.
    pub fn is_realized(&self) -> bool {
        matches!(self, BudgetStatus::Approved | BudgetStatus::Completed)
    }
}

impl std::fmt::Display for BudgetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BudgetStatus::Pending => write!(f, "Pendente"),
            BudgetStatus::Approved => write!(f, "Aprovado"),
            BudgetStatus::Completed => write!(f, "Concluído"),
            BudgetStatus::Cancelled => write!(f, "Cancelado"),
        }
    }
}

impl std::str::FromStr for BudgetStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pendente" | "pending" => Ok(BudgetStatus::Pending),
            "aprovado" | "approved" => Ok(BudgetStatus::Approved),
            "concluído" | "concluido" | "completed" => Ok(BudgetStatus::Completed),
            "cancelado" | "cancelled" => Ok(BudgetStatus::Cancelled),
            _ => Err(format!("Unknown budget status: {}", s)),
        }
    }
}

/// Denormalized snapshot of a linked equipment, not a live reference.
/// The tag/name are frozen at link time so the budget stays readable
/// even if the equipment is later renamed or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentLink {
    pub id: String,
    pub tag: String,
    pub name: String,
}

/// Validation failures reported before anything is persisted
#[derive(Debug, Error, Diagnostic)]
pub enum BudgetError {
    #[error("a budget needs at least one linked equipment")]
    #[diagnostic(code(cmt::budget::no_equipment))]
    NoEquipment,

    #[error("a budget needs a provider")]
    #[diagnostic(code(cmt::budget::no_provider))]
    NoProvider,

    #[error("budget cost must be positive (got {0})")]
    #[diagnostic(code(cmt::budget::invalid_cost))]
    InvalidCost(f64),
}

/// Budget / service cost record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetRecord {
    pub id: String,

    #[serde(default)]
    pub equipments: Vec<EquipmentLink>,

    pub provider: String,

    pub date: NaiveDate,

    pub service: ServiceType,

    pub cost: f64,

    #[serde(default)]
    pub status: BudgetStatus,

    #[serde(default)]
    pub notes: String,

    // Flat fields accepted from files written before multi-equipment
    // budgets; folded into `equipments` by `migrated`.
    #[serde(default, skip_serializing)]
    equipment_id: Option<String>,
    #[serde(default, skip_serializing)]
    equipment_tag: Option<String>,
    #[serde(default, skip_serializing)]
    equipment_name: Option<String>,
}

impl BudgetRecord {
    pub fn new(provider: impl Into<String>, date: NaiveDate, service: ServiceType, cost: f64) -> Self {
        Self {
            id: RecordPrefix::Budget.new_id(),
            equipments: Vec::new(),
            provider: provider.into(),
            date,
            service,
            cost,
            status: BudgetStatus::Pending,
            notes: String::new(),
            equipment_id: None,
            equipment_tag: None,
            equipment_name: None,
        }
    }

    /// Fold a single-equipment flat record into the `equipments` list.
    /// Idempotent; records already carrying links are returned unchanged.
    pub fn migrated(mut self) -> Self {
        if self.equipments.is_empty() {
            if let Some(id) = self.equipment_id.take() {
                self.equipments.push(EquipmentLink {
                    id,
                    tag: self.equipment_tag.take().unwrap_or_default(),
                    name: self.equipment_name.take().unwrap_or_default(),
                });
            }
        }
        self
    }

    /// Checked before persisting; no partial mutation on failure
    pub fn validate(&self) -> Result<(), BudgetError> {
        if self.equipments.is_empty() {
            return Err(BudgetError::NoEquipment);
        }
        if self.provider.trim().is_empty() {
            return Err(BudgetError::NoProvider);
        }
        if !(self.cost > 0.0) {
            return Err(BudgetError::InvalidCost(self.cost));
        }
        Ok(())
    }

    /// Case-insensitive search over linked tags and names
    pub fn matches_search(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        self.equipments.iter().any(|e| {
            e.tag.to_lowercase().contains(&term) || e.name.to_lowercase().contains(&term)
        }) || self.provider.to_lowercase().contains(&term)
    }
}
