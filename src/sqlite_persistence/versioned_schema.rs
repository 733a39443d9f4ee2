use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection};

pub const DEFAULT_TIMESTAMP: &str = "(cast(strftime('%s','now') as int))";

/// `user_version` offset, so a database never created by us (user_version 0)
/// is never mistaken for schema version 0.
pub const BASE_DB_VERSION: usize = 77000;

#[macro_export]
macro_rules! sqlite_column {
    ($name:expr, $sql_type:expr $(, $field:ident = $value:expr)*) => {
        {
            #[allow(unused_mut)]
            let mut column = $crate::sqlite_persistence::Column {
                name: $name,
                sql_type: $sql_type,
                is_primary_key: false,
                non_null: false,
                default_value: None,
                foreign_key: None,
            };
            $(
                column.$field = $value;
            )*
            column
        }
    };
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SqlType {
    Text,
    Integer,
    Real,
}

impl SqlType {
    fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
        }
    }

    fn parse(declared: &str) -> Option<SqlType> {
        match declared {
            "TEXT" => Some(SqlType::Text),
            "INTEGER" => Some(SqlType::Integer),
            "REAL" => Some(SqlType::Real),
            _ => None,
        }
    }
}

/// A column referencing another table. Deleting the parent row cascades.
pub struct ForeignKey {
    pub foreign_table: &'static str,
    pub foreign_column: &'static str,
}

pub struct Column {
    pub name: &'static str,
    pub sql_type: &'static SqlType,
    pub is_primary_key: bool,
    pub non_null: bool,
    pub default_value: Option<&'static str>,
    pub foreign_key: Option<&'static ForeignKey>,
}

impl Column {
    fn definition(&self) -> String {
        let mut sql = format!("{} {}", self.name, self.sql_type.as_sql());
        if self.is_primary_key {
            sql.push_str(" PRIMARY KEY");
        }
        if self.non_null {
            sql.push_str(" NOT NULL");
        }
        if let Some(default_value) = self.default_value {
            sql.push_str(&format!(" DEFAULT {}", default_value));
        }
        if let Some(fk) = self.foreign_key {
            sql.push_str(&format!(
                " REFERENCES {}({}) ON DELETE CASCADE",
                fk.foreign_table, fk.foreign_column
            ));
        }
        sql
    }
}

pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column],
    pub indices: &'static [(&'static str, &'static str)],
    pub unique_constraints: &'static [&'static [&'static str]],
}

impl Table {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        let mut parts: Vec<String> = self.columns.iter().map(Column::definition).collect();
        for unique in self.unique_constraints {
            parts.push(format!("UNIQUE ({})", unique.join(", ")));
        }
        conn.execute(
            &format!("CREATE TABLE {} ({});", self.name, parts.join(", ")),
            params![],
        )
        .with_context(|| format!("Failed to create table {}", self.name))?;

        for (index_name, column_name) in self.indices {
            conn.execute(
                &format!(
                    "CREATE INDEX {} ON {}({});",
                    index_name, self.name, column_name
                ),
                params![],
            )?;
        }
        Ok(())
    }

    /// Compares the live table against this definition: column names, types,
    /// nullability, defaults, primary key and declared indices.
    pub fn validate(&self, conn: &Connection) -> Result<()> {
        struct LiveColumn {
            name: String,
            declared_type: String,
            non_null: bool,
            default_value: Option<String>,
            is_primary_key: bool,
        }

        let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", self.name))?;
        let live: Vec<LiveColumn> = stmt
            .query_map(params![], |row| {
                Ok(LiveColumn {
                    name: row.get(1)?,
                    declared_type: row.get(2)?,
                    non_null: row.get::<_, i32>(3)? == 1,
                    default_value: row.get(4)?,
                    is_primary_key: row.get::<_, i32>(5)? == 1,
                })
            })?
            .collect::<rusqlite::Result<_>>()?;

        if live.len() != self.columns.len() {
            bail!(
                "Table {} has {} columns, expected {} ({})",
                self.name,
                live.len(),
                self.columns.len(),
                self.columns
                    .iter()
                    .map(|c| c.name)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        for (actual, expected) in live.iter().zip(self.columns.iter()) {
            if actual.name != expected.name {
                bail!(
                    "Table {} column name mismatch: expected {}, got {}",
                    self.name,
                    expected.name,
                    actual.name
                );
            }
            if SqlType::parse(&actual.declared_type).as_ref() != Some(expected.sql_type) {
                bail!(
                    "Table {} column {} type mismatch: expected {:?}, got {}",
                    self.name,
                    expected.name,
                    expected.sql_type,
                    actual.declared_type
                );
            }
            if actual.non_null != expected.non_null {
                bail!(
                    "Table {} column {} non-null mismatch: expected {}",
                    self.name,
                    expected.name,
                    expected.non_null
                );
            }
            if actual.is_primary_key != expected.is_primary_key {
                bail!(
                    "Table {} column {} primary key mismatch: expected {}",
                    self.name,
                    expected.name,
                    expected.is_primary_key
                );
            }
            // sqlite may report the default with or without the outer parentheses
            let actual_default = actual.default_value.as_deref().map(strip_parentheses);
            let expected_default = expected.default_value.map(strip_parentheses);
            if actual_default != expected_default {
                bail!(
                    "Table {} column {} default mismatch: expected {:?}, got {:?}",
                    self.name,
                    expected.name,
                    expected.default_value,
                    actual.default_value
                );
            }
        }

        for (index_name, _) in self.indices {
            let exists: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='index' AND name=?1 AND tbl_name=?2",
                params![index_name, self.name],
                |r| r.get(0),
            )?;
            if exists == 0 {
                bail!("Table {} is missing index '{}'", self.name, index_name);
            }
        }
        Ok(())
    }
}

fn strip_parentheses(s: &str) -> &str {
    s.strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(s)
}

pub struct VersionedSchema {
    pub version: usize,
    pub tables: &'static [Table],
    /// Brings a database at `version - 1` up to this version.
    pub migration: Option<fn(&Connection) -> Result<()>>,
}

impl VersionedSchema {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        conn.execute("PRAGMA foreign_keys = ON;", params![])?;
        for table in self.tables {
            table.create(conn)?;
        }
        conn.pragma_update(None, "user_version", BASE_DB_VERSION + self.version)?;
        Ok(())
    }

    pub fn validate(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            table.validate(conn)?;
        }
        Ok(())
    }
}

/// Creates, validates and migrates a database against an ordered list of
/// schema versions. A fresh database is created directly at the latest
/// version; an existing one must validate against its recorded version
/// before the remaining migrations run inside a single transaction.
pub fn open_versioned(conn: &mut Connection, schemas: &[VersionedSchema], label: &str) -> Result<()> {
    let latest = schemas
        .last()
        .with_context(|| format!("No schema versions defined for {} db", label))?;

    let table_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |r| r.get(0),
    )?;
    if table_count == 0 {
        tracing::info!("Creating {} db schema at version {}", label, latest.version);
        return latest.create(conn);
    }

    let user_version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    if user_version < BASE_DB_VERSION as i64 {
        bail!(
            "{} db has unknown user_version {}, refusing to touch it",
            label,
            user_version
        );
    }
    let mut current = (user_version - BASE_DB_VERSION as i64) as usize;
    let recorded = schemas
        .iter()
        .find(|s| s.version == current)
        .with_context(|| format!("{} db is at unsupported version {}", label, current))?;
    recorded
        .validate(conn)
        .with_context(|| format!("{} db failed validation at version {}", label, current))?;

    if current >= latest.version {
        return Ok(());
    }

    let recorded_version = current;
    let tx = conn.transaction()?;
    for schema in schemas.iter().filter(|s| s.version > recorded_version) {
        if let Some(migration) = schema.migration {
            tracing::info!(
                "Migrating {} db from version {} to {}",
                label,
                current,
                schema.version
            );
            migration(&tx)?;
        }
        current = schema.version;
    }
    tx.pragma_update(None, "user_version", BASE_DB_VERSION + current)?;
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite_column;

    const PARENT: Table = Table {
        name: "parent",
        columns: &[
            sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
            sqlite_column!("label", &SqlType::Text, non_null = true),
            sqlite_column!(
                "created",
                &SqlType::Integer,
                non_null = true,
                default_value = Some(DEFAULT_TIMESTAMP)
            ),
        ],
        indices: &[("idx_parent_label", "label")],
        unique_constraints: &[&["label"]],
    };

    const PARENT_V1: Table = Table {
        name: "parent",
        columns: &[
            sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
            sqlite_column!("label", &SqlType::Text, non_null = true),
            sqlite_column!(
                "created",
                &SqlType::Integer,
                non_null = true,
                default_value = Some(DEFAULT_TIMESTAMP)
            ),
            sqlite_column!("note", &SqlType::Text),
        ],
        indices: &[("idx_parent_label", "label")],
        unique_constraints: &[&["label"]],
    };

    fn add_note(conn: &Connection) -> Result<()> {
        conn.execute("ALTER TABLE parent ADD COLUMN note TEXT", [])?;
        Ok(())
    }

    const SCHEMAS: &[VersionedSchema] = &[
        VersionedSchema {
            version: 0,
            tables: &[PARENT],
            migration: None,
        },
        VersionedSchema {
            version: 1,
            tables: &[PARENT_V1],
            migration: Some(add_note),
        },
    ];

    #[test]
    fn created_schema_validates() {
        let conn = Connection::open_in_memory().unwrap();
        SCHEMAS[0].create(&conn).unwrap();
        SCHEMAS[0].validate(&conn).unwrap();
        assert!(SCHEMAS[1].validate(&conn).is_err());
    }

    #[test]
    fn migrates_old_database_forward() {
        let mut conn = Connection::open_in_memory().unwrap();
        SCHEMAS[0].create(&conn).unwrap();
        conn.execute("INSERT INTO parent (label) VALUES ('kept')", [])
            .unwrap();

        open_versioned(&mut conn, SCHEMAS, "test").unwrap();

        SCHEMAS[1].validate(&conn).unwrap();
        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, (BASE_DB_VERSION + 1) as i64);
        let label: String = conn
            .query_row("SELECT label FROM parent", [], |r| r.get(0))
            .unwrap();
        assert_eq!(label, "kept");
    }

    #[test]
    fn fresh_database_is_created_at_latest_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        open_versioned(&mut conn, SCHEMAS, "test").unwrap();
        SCHEMAS[1].validate(&conn).unwrap();
    }

    #[test]
    fn refuses_foreign_database() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE other (x INTEGER)", []).unwrap();
        let err = open_versioned(&mut conn, SCHEMAS, "test").unwrap_err();
        assert!(err.to_string().contains("unknown user_version"));
    }
}
