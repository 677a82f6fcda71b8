//! Quick-question storage.
//!
//! Questions for a document are only ever replaced as a complete set,
//! inside one transaction. There is no partial update path.

use rusqlite::params;
use uuid::Uuid;

use super::Database;
use super::models::QuickQuestion;
use crate::error::{DatabaseError, ServiceResult};

impl Database {
    /// Replace all questions for a document with a new set.
    ///
    /// Delete and insert run in one transaction, so readers never
    /// observe a mix of old and new questions.
    pub fn replace_questions(
        &self,
        document_id: &str,
        questions: &[(String, String)],
        source_tag: &str,
    ) -> ServiceResult<Vec<QuickQuestion>> {
        let mut conn = self.conn.lock().unwrap();

        let tx = conn.transaction().map_err(DatabaseError::Query)?;

        tx.execute(
            "DELETE FROM quick_questions WHERE document_id = ?1",
            params![document_id],
        )
        .map_err(DatabaseError::Query)?;

        let mut stored = Vec::with_capacity(questions.len());
        for (title, question_text) in questions {
            let id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO quick_questions (id, document_id, title, question_text, source_tag) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, document_id, title, question_text, source_tag],
            )
            .map_err(DatabaseError::Query)?;

            stored.push(
                tx.query_row(
                    "SELECT id, document_id, title, question_text, source_tag, created_at \
                     FROM quick_questions WHERE id = ?1",
                    params![id],
                    QuickQuestion::from_row,
                )
                .map_err(DatabaseError::Query)?,
            );
        }

        tx.commit().map_err(DatabaseError::Query)?;

        Ok(stored)
    }

    /// List questions for a document in insertion order
    pub fn list_questions(&self, document_id: &str) -> ServiceResult<Vec<QuickQuestion>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(
                "SELECT id, document_id, title, question_text, source_tag, created_at \
                 FROM quick_questions WHERE document_id = ?1 ORDER BY rowid ASC",
            )
            .map_err(DatabaseError::Query)?;

        let rows = stmt
            .query_map(params![document_id], QuickQuestion::from_row)
            .map_err(DatabaseError::Query)?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::Query)
            .map_err(Into::into)
    }

    /// Number of stored questions for a document
    pub fn count_questions(&self, document_id: &str) -> ServiceResult<i64> {
        let conn = self.conn.lock().unwrap();

        conn.query_row(
            "SELECT COUNT(*) FROM quick_questions WHERE document_id = ?1",
            params![document_id],
            |row| row.get(0),
        )
        .map_err(DatabaseError::Query)
        .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::make_document;

    fn question_set(n: usize) -> Vec<(String, String)> {
        (0..n)
            .map(|i| (format!("Title {i}"), format!("Question text {i}?")))
            .collect()
    }

    #[test]
    fn replace_is_exact_not_merge() {
        let db = Database::open_in_memory().unwrap();
        db.insert_document(&make_document("doc-1", "alice")).unwrap();

        db.replace_questions("doc-1", &question_set(5), "auto")
            .unwrap();
        assert_eq!(db.count_questions("doc-1").unwrap(), 5);

        // A smaller regenerated set fully replaces the old one.
        let stored = db
            .replace_questions("doc-1", &question_set(3), "auto")
            .unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(db.count_questions("doc-1").unwrap(), 3);

        let listed = db.list_questions("doc-1").unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].title, "Title 0");
        assert_eq!(listed[2].question_text, "Question text 2?");
    }

    #[test]
    fn questions_are_scoped_per_document() {
        let db = Database::open_in_memory().unwrap();
        db.insert_document(&make_document("doc-1", "alice")).unwrap();
        db.insert_document(&make_document("doc-2", "alice")).unwrap();

        db.replace_questions("doc-1", &question_set(4), "auto")
            .unwrap();
        db.replace_questions("doc-2", &question_set(2), "auto")
            .unwrap();

        assert_eq!(db.count_questions("doc-1").unwrap(), 4);
        assert_eq!(db.count_questions("doc-2").unwrap(), 2);

        db.replace_questions("doc-1", &question_set(1), "auto")
            .unwrap();
        assert_eq!(db.count_questions("doc-2").unwrap(), 2);
    }

    #[test]
    fn delete_document_cascades_to_questions() {
        let db = Database::open_in_memory().unwrap();
        db.insert_document(&make_document("doc-1", "alice")).unwrap();
        db.replace_questions("doc-1", &question_set(3), "auto")
            .unwrap();

        db.delete_document("doc-1").unwrap();
        assert_eq!(db.count_questions("doc-1").unwrap(), 0);
    }
}
