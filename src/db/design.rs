//! Shared flow designs
//!
//! Designs are opaque JSON documents with a little metadata. Listing is
//! newest first; the tag filter matches whole tags only.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::DbPool;
use crate::{Error, Result};

/// A stored design
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Design {
    pub id: String,
    pub title: String,
    pub description: String,
    pub author: String,
    /// Design document; always a JSON object
    pub content: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub tags: Vec<String>,
    pub downloads: i64,
}

/// Fields supplied when creating or replacing a design
#[derive(Debug, Clone, Deserialize)]
pub struct NewDesign {
    pub title: String,
    pub description: String,
    pub author: String,
    pub content: serde_json::Value,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewDesign {
    /// Check that the document is a JSON object
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if `content` is not an object
    pub fn validate(&self) -> Result<()> {
        if self.content.is_object() {
            Ok(())
        } else {
            Err(Error::InvalidInput("content must be a JSON object".to_string()))
        }
    }
}

/// Paging and filtering for [`DesignRepo::list`]
#[derive(Debug, Clone, Deserialize)]
pub struct DesignQuery {
    #[serde(default)]
    pub skip: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
    pub tag: Option<String>,
}

const fn default_limit() -> u32 {
    10
}

impl Default for DesignQuery {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: default_limit(),
            tag: None,
        }
    }
}

/// Repository for design operations
#[derive(Clone)]
pub struct DesignRepo {
    pool: DbPool,
}

impl DesignRepo {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Store a new design with a fresh id and zero downloads
    ///
    /// # Errors
    ///
    /// Returns error if the content is not an object or the insert fails
    pub fn create(&self, new: &NewDesign) -> Result<Design> {
        new.validate()?;
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;

        let design = Design {
            id: uuid::Uuid::new_v4().to_string(),
            title: new.title.clone(),
            description: new.description.clone(),
            author: new.author.clone(),
            content: new.content.clone(),
            created_at: Utc::now(),
            tags: new.tags.clone(),
            downloads: 0,
        };

        conn.execute(
            "INSERT INTO designs (id, title, description, author, content, created_at, tags, downloads)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)",
            rusqlite::params![
                design.id,
                design.title,
                design.description,
                design.author,
                serde_json::to_string(&design.content)?,
                timestamp(&design.created_at),
                serde_json::to_string(&design.tags)?,
            ],
        )?;

        tracing::info!(id = %design.id, title = %design.title, "design created");
        Ok(design)
    }

    /// List designs, newest first
    ///
    /// # Errors
    ///
    /// Returns error if the query fails
    pub fn list(&self, query: &DesignQuery) -> Result<Vec<Design>> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;

        let mut stmt = conn.prepare(
            "SELECT id, title, description, author, content, created_at, tags, downloads
             FROM designs
             WHERE ?1 IS NULL
                OR EXISTS (SELECT 1 FROM json_each(designs.tags) WHERE json_each.value = ?1)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2 OFFSET ?3",
        )?;

        let designs = stmt
            .query_map(
                rusqlite::params![query.tag, query.limit, query.skip],
                row_to_design,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(designs)
    }

    /// Get a design by id
    ///
    /// # Errors
    ///
    /// Returns error if the query fails
    pub fn get(&self, id: &str) -> Result<Option<Design>> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;

        let result = conn.query_row(
            "SELECT id, title, description, author, content, created_at, tags, downloads
             FROM designs WHERE id = ?1",
            [id],
            row_to_design,
        );

        match result {
            Ok(design) => Ok(Some(design)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace a design's editable fields
    ///
    /// Keeps id, creation time and download count. Returns the updated
    /// design, or `None` if no design has this id.
    ///
    /// # Errors
    ///
    /// Returns error if the content is not an object or the update fails
    pub fn update(&self, id: &str, new: &NewDesign) -> Result<Option<Design>> {
        new.validate()?;
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;

        let rows = conn.execute(
            "UPDATE designs
             SET title = ?2, description = ?3, author = ?4, content = ?5, tags = ?6
             WHERE id = ?1",
            rusqlite::params![
                id,
                new.title,
                new.description,
                new.author,
                serde_json::to_string(&new.content)?,
                serde_json::to_string(&new.tags)?,
            ],
        )?;
        drop(conn);

        if rows == 0 {
            return Ok(None);
        }

        tracing::info!(id, "design updated");
        self.get(id)
    }

    /// Delete a design; returns whether it existed
    ///
    /// # Errors
    ///
    /// Returns error if the delete fails
    pub fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;
        let rows = conn.execute("DELETE FROM designs WHERE id = ?1", [id])?;

        if rows > 0 {
            tracing::info!(id, "design deleted");
        }
        Ok(rows > 0)
    }

    /// Bump the download counter; returns whether the design exists
    ///
    /// # Errors
    ///
    /// Returns error if the update fails
    pub fn increment_downloads(&self, id: &str) -> Result<bool> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;
        let rows = conn.execute(
            "UPDATE designs SET downloads = downloads + 1 WHERE id = ?1",
            [id],
        )?;
        Ok(rows > 0)
    }
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn row_to_design(row: &rusqlite::Row<'_>) -> rusqlite::Result<Design> {
    let content: String = row.get(4)?;
    let created_at: String = row.get(5)?;
    let tags: String = row.get(6)?;

    Ok(Design {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        author: row.get(3)?,
        content: serde_json::from_str(&content).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
            })?,
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        downloads: row.get(7)?,
    })
}
