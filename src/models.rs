use chrono::NaiveDate;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

use crate::error::{ResiduosError, Result};
use crate::text::strip_accents;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    Sale,
    Transfer,
}

impl OperationType {
    /// Stored and displayed label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Sale => "Venda",
            Self::Transfer => "Transferência",
        }
    }

    /// Case- and accent-insensitive; English names are accepted as well.
    pub fn parse(raw: &str) -> Option<Self> {
        match strip_accents(raw.trim()).to_lowercase().as_str() {
            "venda" | "sale" => Some(Self::Sale),
            "transferencia" | "transfer" => Some(Self::Transfer),
            _ => None,
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for OperationType {
    type Err = ResiduosError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| {
            ResiduosError::Validation(format!("unknown operation type '{s}' (use Venda or Transferência)"))
        })
    }
}

impl ToSql for OperationType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.label()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::User => "User",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = ResiduosError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "user" => Ok(Self::User),
            _ => Err(ResiduosError::Validation(format!("unknown role '{s}' (use Admin or User)"))),
        }
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        s.parse().map_err(|_| FromSqlError::Other(format!("unknown role '{s}'").into()))
    }
}

/// One sale or transfer as stored in `registros`.
///
/// The dimension fields hold copies of option-list labels, not references:
/// renaming or removing an option leaves historical records as they were.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: i64,
    pub date: NaiveDate,
    pub operation_type: Option<OperationType>,
    pub regional: String,
    pub branch: String,
    pub destination: String,
    pub product: String,
    pub quantity: f64,
    pub unit: String,
    pub unit_price: f64,
    pub total_value: f64,
    pub invoice: String,
    pub notes: String,
    pub created_at: Option<String>,
    pub created_by: String,
}

impl Record {
    pub const SELECT_COLUMNS: &'static str = "id, data, tipo_operacao, regional, filial_remetente, destino, produto, \
         quantidade, unidade, preco_unitario, valor_total, nfe, observacoes, data_lancamento, usuario_lancamento";

    /// Maps a row selected with [`Record::SELECT_COLUMNS`].
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let op: Option<String> = row.get(2)?;
        Ok(Record {
            id: row.get(0)?,
            date: row.get(1)?,
            operation_type: op.as_deref().and_then(OperationType::parse),
            regional: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            branch: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            destination: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            product: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
            quantity: row.get::<_, Option<f64>>(7)?.unwrap_or(0.0),
            unit: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
            unit_price: row.get::<_, Option<f64>>(9)?.unwrap_or(0.0),
            total_value: row.get::<_, Option<f64>>(10)?.unwrap_or(0.0),
            invoice: row.get::<_, Option<String>>(11)?.unwrap_or_default(),
            notes: row.get::<_, Option<String>>(12)?.unwrap_or_default(),
            created_at: row.get(13)?,
            created_by: row.get::<_, Option<String>>(14)?.unwrap_or_default(),
        })
    }

    pub fn operation_label(&self) -> &'static str {
        self.operation_type.map(|o| o.label()).unwrap_or("")
    }
}

/// Caller-supplied fields for add and update. A positive `total_value`
/// takes precedence over `unit_price`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordInput {
    pub date: NaiveDate,
    pub operation_type: OperationType,
    pub regional: String,
    pub branch: String,
    pub destination: String,
    pub product: String,
    pub quantity: f64,
    pub unit: String,
    pub unit_price: f64,
    pub total_value: f64,
    pub invoice: String,
    pub notes: String,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
}

/// The configurable lists behind the dimension fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionList {
    Regional,
    Branch,
    Destination,
    Product,
    Unit,
}

impl OptionList {
    pub const ALL: [OptionList; 5] = [
        OptionList::Regional,
        OptionList::Branch,
        OptionList::Destination,
        OptionList::Product,
        OptionList::Unit,
    ];

    pub fn table(&self) -> &'static str {
        match self {
            Self::Regional => "regionais",
            Self::Branch => "filiais",
            Self::Destination => "destinos",
            Self::Product => "produtos",
            Self::Unit => "unidades",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Regional => "Regional",
            Self::Branch => "Filial Remetente",
            Self::Destination => "Destino",
            Self::Product => "Produto",
            Self::Unit => "Unidade",
        }
    }

    /// Matching column in `registros`.
    pub fn record_column(&self) -> &'static str {
        match self {
            Self::Regional => "regional",
            Self::Branch => "filial_remetente",
            Self::Destination => "destino",
            Self::Product => "produto",
            Self::Unit => "unidade",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActivityEntry {
    pub id: i64,
    pub timestamp: String,
    pub user_name: String,
    pub action: String,
    pub details: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_type_parse() {
        assert_eq!(OperationType::parse("venda"), Some(OperationType::Sale));
        assert_eq!(OperationType::parse(" VENDA "), Some(OperationType::Sale));
        assert_eq!(OperationType::parse("Transferencia"), Some(OperationType::Transfer));
        assert_eq!(OperationType::parse("transferência"), Some(OperationType::Transfer));
        assert_eq!(OperationType::parse("transfer"), Some(OperationType::Transfer));
        assert_eq!(OperationType::parse("doação"), None);
        assert!("x".parse::<OperationType>().is_err());
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("User".parse::<Role>().unwrap(), Role::User);
        assert!("root".parse::<Role>().is_err());
    }
}
