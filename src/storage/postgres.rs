use async_trait::async_trait;
use serde_json::Value;
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    project, value_as_text, Collection, Document, Projection, Query, StorageError, ID_FIELD,
};

/// PostgreSQL-backed document collection
///
/// Each collection is a table of `(_id TEXT, doc JSONB, created_at)`. Unique
/// schema fields become unique expression indexes named `<table>_<field>_key`,
/// which is how duplicate-key violations are traced back to a field.
pub struct PgCollection {
    name: String,
    pool: PgPool,
}

impl PgCollection {
    pub fn new(name: impl Into<String>, pool: PgPool) -> Result<Self, StorageError> {
        let name = name.into();
        if !is_valid_identifier(&name) {
            return Err(StorageError::InvalidCollection(name));
        }
        Ok(Self { name, pool })
    }

    /// Create the backing table and unique indexes if they do not exist yet
    pub async fn ensure(&self, unique_fields: &[String]) -> Result<(), StorageError> {
        let create_table = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                _id TEXT PRIMARY KEY,
                doc JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
            quote_identifier(&self.name)
        );
        sqlx::query(&create_table).execute(&self.pool).await?;

        for field in unique_fields {
            if !is_valid_identifier(field) {
                return Err(StorageError::InvalidCollection(format!("{}.{}", self.name, field)));
            }
            let create_index = format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ((doc ->> '{}'))",
                quote_identifier(&self.index_name(field)),
                quote_identifier(&self.name),
                field
            );
            sqlx::query(&create_index).execute(&self.pool).await?;
        }

        info!("Ensured collection table: {}", self.name);
        Ok(())
    }

    fn index_name(&self, field: &str) -> String {
        format!("{}_{}_key", self.name, field)
    }

    /// Translate a constraint name reported by PostgreSQL back to the field
    fn field_for_constraint(&self, constraint: &str) -> String {
        constraint
            .strip_prefix(&format!("{}_", self.name))
            .and_then(|rest| rest.strip_suffix("_key"))
            .unwrap_or(constraint)
            .to_string()
    }

    fn map_error(&self, err: sqlx::Error) -> StorageError {
        match StorageError::from(err) {
            StorageError::DuplicateKey { field } => StorageError::DuplicateKey {
                field: self.field_for_constraint(&field),
            },
            other => other,
        }
    }

    fn select_sql(&self, query: &Query, limit_one: bool) -> (String, Vec<String>) {
        let (where_sql, binds) = where_clause(query);
        let mut sql = format!(
            "SELECT _id, doc FROM {}{} ORDER BY created_at",
            quote_identifier(&self.name),
            where_sql
        );
        if limit_one {
            sql.push_str(" LIMIT 1");
        }
        (sql, binds)
    }
}

fn where_clause(query: &Query) -> (String, Vec<String>) {
    match query {
        Query::All => (String::new(), Vec::new()),
        Query::Eq { field, value } if field == ID_FIELD => {
            (" WHERE _id = $1".to_string(), vec![value_as_text(value)])
        }
        Query::Eq { field, value } => (
            " WHERE doc ->> $1 = $2".to_string(),
            vec![field.clone(), value_as_text(value)],
        ),
    }
}

fn row_to_document(row: &PgRow) -> Result<Document, StorageError> {
    let id: String = row.try_get("_id")?;
    let doc: Value = row.try_get("doc")?;

    let mut document = match doc {
        Value::Object(map) => map,
        _ => Document::new(),
    };
    document.insert(ID_FIELD.to_string(), Value::String(id));
    Ok(document)
}

/// Quote SQL identifier to prevent injection
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[async_trait]
impl Collection for PgCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(
        &self,
        query: &Query,
        projection: Option<&Projection>,
    ) -> Result<Vec<Document>, StorageError> {
        let (sql, binds) = self.select_sql(query, false);
        debug!("find on {}: {}", self.name, sql);

        let mut q = sqlx::query(&sql);
        for value in binds {
            q = q.bind(value);
        }
        let rows = q.fetch_all(&self.pool).await.map_err(|e| self.map_error(e))?;

        rows.iter()
            .map(|row| row_to_document(row).map(|doc| project(doc, projection)))
            .collect()
    }

    async fn find_one(
        &self,
        query: &Query,
        projection: Option<&Projection>,
    ) -> Result<Option<Document>, StorageError> {
        let (sql, binds) = self.select_sql(query, true);
        debug!("find_one on {}: {}", self.name, sql);

        let mut q = sqlx::query(&sql);
        for value in binds {
            q = q.bind(value);
        }
        let row = q
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| self.map_error(e))?;

        row.as_ref()
            .map(|r| row_to_document(r).map(|doc| project(doc, projection)))
            .transpose()
    }

    async fn insert(&self, mut doc: Document) -> Result<Document, StorageError> {
        let id = Uuid::new_v4().to_string();
        doc.remove(ID_FIELD);

        let sql = format!(
            "INSERT INTO {} (_id, doc) VALUES ($1, $2)",
            quote_identifier(&self.name)
        );
        sqlx::query(&sql)
            .bind(&id)
            .bind(Value::Object(doc.clone()))
            .execute(&self.pool)
            .await
            .map_err(|e| self.map_error(e))?;

        doc.insert(ID_FIELD.to_string(), Value::String(id));
        Ok(doc)
    }

    async fn save(&self, id: &str, mut doc: Document) -> Result<Option<Document>, StorageError> {
        doc.remove(ID_FIELD);

        let sql = format!(
            "UPDATE {} SET doc = $2 WHERE _id = $1",
            quote_identifier(&self.name)
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(Value::Object(doc.clone()))
            .execute(&self.pool)
            .await
            .map_err(|e| self.map_error(e))?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }

        doc.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
        Ok(Some(doc))
    }

    async fn remove(&self, query: &Query) -> Result<u64, StorageError> {
        let (where_sql, binds) = where_clause(query);
        let sql = format!("DELETE FROM {}{}", quote_identifier(&self.name), where_sql);

        let mut q = sqlx::query(&sql);
        for value in binds {
            q = q.bind(value);
        }
        let result = q.execute(&self.pool).await.map_err(|e| self.map_error(e))?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_identifiers() {
        assert!(is_valid_identifier("users"));
        assert!(is_valid_identifier("audit_log_2"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("2users"));
        assert!(!is_valid_identifier("users; DROP TABLE users"));
        assert!(!is_valid_identifier("user-name"));
    }

    #[test]
    fn builds_where_clauses() {
        assert_eq!(where_clause(&Query::all()), (String::new(), vec![]));
        assert_eq!(
            where_clause(&Query::by_id("abc")),
            (" WHERE _id = $1".to_string(), vec!["abc".to_string()])
        );
        assert_eq!(
            where_clause(&Query::eq("age", 9)),
            (
                " WHERE doc ->> $1 = $2".to_string(),
                vec!["age".to_string(), "9".to_string()]
            )
        );
    }

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_identifier("users"), "\"users\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[tokio::test]
    async fn maps_constraint_names_to_fields() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/autocrud_test")
            .unwrap();
        let collection = PgCollection::new("users", pool).unwrap();
        assert_eq!(collection.field_for_constraint("users_username_key"), "username");
        assert_eq!(collection.field_for_constraint("other_idx"), "other_idx");
        assert!(PgCollection::new("bad name", collection.pool.clone()).is_err());
    }

    #[tokio::test]
    async fn unique_violation_reports_schema_field() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/autocrud_test")
            .unwrap();
        let collection = PgCollection::new("users", pool).unwrap();

        let err = collection.map_error(crate::storage::error::fake::sqlx_error(
            "23505",
            Some("users_username_key"),
        ));
        assert!(matches!(err, StorageError::DuplicateKey { ref field } if field == "username"));
    }
}
