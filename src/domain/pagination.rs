use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::DomainError;

/// Column a list query is ordered by. Kept as an enum so no caller text reaches SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    CreatedAt,
    UpdatedAt,
    Amount,
    Status,
}

impl SortField {
    pub fn column(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
            SortField::Amount => "amount",
            SortField::Status => "status",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Default for Sort {
    fn default() -> Self {
        Self {
            field: SortField::CreatedAt,
            direction: SortDirection::Desc,
        }
    }
}

impl FromStr for Sort {
    type Err = DomainError;

    /// Accepts `"<field>"` or `"<field> asc|desc"`; empty input is the default order.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let Some(field) = parts.next() else {
            return Ok(Sort::default());
        };

        let field = match field.to_lowercase().as_str() {
            "created_at" => SortField::CreatedAt,
            "updated_at" => SortField::UpdatedAt,
            "amount" => SortField::Amount,
            "status" => SortField::Status,
            other => {
                return Err(DomainError::validation(format!(
                    "invalid sort field: {}",
                    other
                )));
            }
        };

        let direction = match parts.next().map(str::to_lowercase).as_deref() {
            None | Some("asc") => SortDirection::Asc,
            Some("desc") => SortDirection::Desc,
            Some(other) => {
                return Err(DomainError::validation(format!(
                    "invalid sort direction: {}",
                    other
                )));
            }
        };

        if parts.next().is_some() {
            return Err(DomainError::validation(format!("invalid sort: {}", s)));
        }

        Ok(Sort { field, direction })
    }
}

/// Window and order applied to list queries. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub sort: Sort,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, sort: &str) -> Result<Self, DomainError> {
        if page == 0 {
            return Err(DomainError::validation("page must be at least 1"));
        }
        if limit == 0 {
            return Err(DomainError::validation("limit must be at least 1"));
        }
        Ok(Self {
            page,
            limit,
            sort: sort.parse()?,
        })
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

/// One window of results plus the total number of matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
