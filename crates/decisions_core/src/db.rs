use crate::changes::VersionState;
use crate::schema::{DecisionDocument, DocumentDescriptor};
use crate::sync::{ImportStateStore, RecordImporter};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use time::macros::format_description;
use time::PrimitiveDateTime;

pub fn open(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path).with_context(|| format!("opening {}", db_path.display()))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    init(&conn)?;
    Ok(conn)
}

pub fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS imported_files (
          data_source TEXT NOT NULL,
          path TEXT NOT NULL,
          imported_version TEXT NOT NULL,
          updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
          PRIMARY KEY (data_source, path)
        );

        CREATE TABLE IF NOT EXISTS documents (
          origin_id TEXT PRIMARY KEY,
          data_source TEXT NOT NULL,
          path TEXT NOT NULL,
          url TEXT NOT NULL,
          org TEXT NOT NULL,
          policymaker_abbr TEXT NOT NULL,
          policymaker_id TEXT NOT NULL,
          meeting_nr INTEGER NOT NULL,
          doc_type TEXT NOT NULL,
          language TEXT NOT NULL,
          event_name TEXT NOT NULL,
          location TEXT,
          start_date TEXT NOT NULL,
          end_date TEXT NOT NULL,
          error_count INTEGER NOT NULL,
          raw_json TEXT NOT NULL,
          inserted_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
        );

        CREATE TABLE IF NOT EXISTS attendees (
          origin_id TEXT NOT NULL REFERENCES documents(origin_id),
          ordering INTEGER NOT NULL,
          name TEXT NOT NULL,
          role TEXT,
          title TEXT,
          category TEXT NOT NULL,
          PRIMARY KEY (origin_id, ordering)
        );

        CREATE TABLE IF NOT EXISTS actions (
          origin_id TEXT NOT NULL REFERENCES documents(origin_id),
          ordering INTEGER NOT NULL,
          title TEXT,
          function_id TEXT,
          function_name TEXT,
          case_guid TEXT,
          register_id TEXT,
          decided_at TEXT,
          article_number INTEGER,
          resolution TEXT,
          content TEXT,
          keywords_json TEXT NOT NULL,
          attachments_json TEXT NOT NULL,
          PRIMARY KEY (origin_id, ordering)
        );

        CREATE INDEX IF NOT EXISTS idx_actions_case_guid ON actions(case_guid);
        "#,
    )?;
    Ok(())
}

fn sql_datetime(value: PrimitiveDateTime) -> Result<String> {
    Ok(value.format(format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"))?)
}

/// Version tokens in the `imported_files` table.
pub struct SqliteVersionStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteVersionStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl ImportStateStore for SqliteVersionStore<'_> {
    fn get_version(&self, data_source: &str, path: &str) -> Result<Option<String>> {
        let version = self
            .conn
            .query_row(
                "SELECT imported_version FROM imported_files WHERE data_source = ?1 AND path = ?2",
                params![data_source, path],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version)
    }

    fn set_version(&mut self, data_source: &str, path: &str, version: &str) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO imported_files (data_source, path, imported_version)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(data_source, path) DO UPDATE SET
              imported_version=excluded.imported_version,
              updated_at=strftime('%Y-%m-%dT%H:%M:%fZ','now')
            "#,
            params![data_source, path, version],
        )?;
        Ok(())
    }

    fn known_paths(&self, data_source: &str) -> Result<VersionState> {
        let mut stmt = self
            .conn
            .prepare("SELECT path, imported_version FROM imported_files WHERE data_source = ?1")?;
        let rows = stmt.query_map(params![data_source], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut state = VersionState::new();
        for row in rows {
            let (path, version) = row?;
            state.insert(path, version);
        }
        Ok(state)
    }
}

/// Writes documents, attendees and actions, one transaction per document.
pub struct SqliteRecordImporter<'c> {
    conn: &'c Connection,
    data_source: String,
}

impl<'c> SqliteRecordImporter<'c> {
    pub fn new(conn: &'c Connection, data_source: impl Into<String>) -> Self {
        Self {
            conn,
            data_source: data_source.into(),
        }
    }
}

impl RecordImporter for SqliteRecordImporter<'_> {
    fn import_document(&mut self, descriptor: &DocumentDescriptor, document: &DecisionDocument) -> Result<()> {
        let raw_json = serde_json::to_string(document)?;
        let event = &document.event;
        let origin_id = &descriptor.origin_id;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            r#"
            INSERT INTO documents (
              origin_id, data_source, path, url, org, policymaker_abbr, policymaker_id,
              meeting_nr, doc_type, language, event_name, location, start_date, end_date,
              error_count, raw_json
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            ON CONFLICT(origin_id) DO UPDATE SET
              data_source=excluded.data_source,
              path=excluded.path,
              url=excluded.url,
              org=excluded.org,
              policymaker_abbr=excluded.policymaker_abbr,
              policymaker_id=excluded.policymaker_id,
              meeting_nr=excluded.meeting_nr,
              doc_type=excluded.doc_type,
              language=excluded.language,
              event_name=excluded.event_name,
              location=excluded.location,
              start_date=excluded.start_date,
              end_date=excluded.end_date,
              error_count=excluded.error_count,
              raw_json=excluded.raw_json
            "#,
            params![
                origin_id,
                self.data_source,
                descriptor.path,
                descriptor.url,
                descriptor.org,
                descriptor.policymaker_abbr,
                descriptor.policymaker_id,
                descriptor.meeting_nr,
                document.document_type.as_str(),
                descriptor.language,
                event.name,
                event.location,
                sql_datetime(event.start_date)?,
                sql_datetime(event.end_date)?,
                document.errors.len(),
                raw_json
            ],
        )?;

        tx.execute("DELETE FROM attendees WHERE origin_id = ?1", params![origin_id])?;
        for (ordering, attendee) in event.attendees.iter().enumerate() {
            tx.execute(
                "INSERT INTO attendees (origin_id, ordering, name, role, title, category) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    origin_id,
                    ordering,
                    attendee.name,
                    attendee.role,
                    attendee.title,
                    attendee.category.as_str()
                ],
            )?;
        }

        tx.execute("DELETE FROM actions WHERE origin_id = ?1", params![origin_id])?;
        for (ordering, action) in document.actions.iter().enumerate() {
            let decided_at = action.date.map(sql_datetime).transpose()?;
            tx.execute(
                r#"
                INSERT INTO actions (
                  origin_id, ordering, title, function_id, function_name, case_guid, register_id,
                  decided_at, article_number, resolution, content, keywords_json, attachments_json
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                "#,
                params![
                    origin_id,
                    ordering,
                    action.title,
                    action.function_id,
                    action.function_name,
                    action.case_guid,
                    action.register_id,
                    decided_at,
                    action.article_number,
                    action.resolution.map(|r| r.as_str()),
                    action.content,
                    serde_json::to_string(&action.keywords)?,
                    serde_json::to_string(&action.attachments)?
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Action, Attendee, AttendeeCategory, DocumentType, Event, Resolution};
    use time::macros::{date, datetime};

    fn memory() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();
        conn
    }

    fn descriptor() -> DocumentDescriptor {
        DocumentDescriptor {
            path: "/files/A_1/Org%202016-01-04%20ABC%201%20Pk%20Su.zip".into(),
            url: "http://archive.test/files/A_1/Org%202016-01-04%20ABC%201%20Pk%20Su.zip".into(),
            org: "Org".into(),
            date: date!(2016 - 01 - 04),
            year: 2016,
            policymaker_abbr: "ABC".into(),
            policymaker_id: "1".into(),
            meeting_nr: 1,
            doc_type_code: "Pk".into(),
            doc_type: DocumentType::Minutes,
            language: "Su".into(),
            origin_id: "Org_ABC_2016-1_Pk".into(),
            last_modified_text: "1/5/2016 11:06 AM".into(),
            last_modified: datetime!(2016-01-05 11:06),
            size: 129710,
        }
    }

    fn document(titles: &[&str]) -> DecisionDocument {
        DecisionDocument {
            document_type: DocumentType::Minutes,
            event: Event {
                name: "Kaupunginhallitus 1/2016".into(),
                location: None,
                start_date: datetime!(2016-02-02 16:30),
                end_date: datetime!(2016-02-02 19:37),
                attendees: vec![Attendee {
                    name: "Matti Virtanen".into(),
                    role: None,
                    title: None,
                    category: AttendeeCategory::Participant,
                }],
            },
            actions: titles
                .iter()
                .map(|title| Action {
                    title: Some(title.to_string()),
                    resolution: Some(Resolution::Accepted),
                    date: Some(datetime!(2016-02-02 0:00)),
                    ..Action::default()
                })
                .collect(),
            errors: vec![],
        }
    }

    #[test]
    fn versions_round_trip_per_data_source() {
        let conn = memory();
        let mut store = SqliteVersionStore::new(&conn);
        assert_eq!(store.get_version("helsinki", "/a").unwrap(), None);

        store.set_version("helsinki", "/a", "v1").unwrap();
        store.set_version("helsinki", "/a", "v2").unwrap();
        store.set_version("espoo", "/b", "v1").unwrap();

        assert_eq!(store.get_version("helsinki", "/a").unwrap().as_deref(), Some("v2"));
        let known = store.known_paths("helsinki").unwrap();
        assert_eq!(known, VersionState::from([("/a".to_string(), "v2".to_string())]));
    }

    #[test]
    fn reimport_replaces_actions_in_order() {
        let conn = memory();
        let mut importer = SqliteRecordImporter::new(&conn, "helsinki");
        importer.import_document(&descriptor(), &document(&["a", "b", "c"])).unwrap();
        importer.import_document(&descriptor(), &document(&["second", "first"])).unwrap();

        let documents: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |r| r.get(0)).unwrap();
        assert_eq!(documents, 1);

        let mut stmt = conn
            .prepare("SELECT title, resolution, decided_at FROM actions ORDER BY ordering")
            .unwrap();
        let rows: Vec<(String, String, String)> = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(
            rows,
            vec![
                ("second".into(), "accepted".into(), "2016-02-02T00:00:00".into()),
                ("first".into(), "accepted".into(), "2016-02-02T00:00:00".into()),
            ]
        );

        let start: String = conn.query_row("SELECT start_date FROM documents", [], |r| r.get(0)).unwrap();
        assert_eq!(start, "2016-02-02T16:30:00");
    }

    #[test]
    fn file_database_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decisions.db");
        let conn = open(&path).unwrap();
        SqliteVersionStore::new(&conn).set_version("helsinki", "/a", "v1").unwrap();
        drop(conn);

        let conn = open(&path).unwrap();
        assert_eq!(
            SqliteVersionStore::new(&conn).get_version("helsinki", "/a").unwrap().as_deref(),
            Some("v1")
        );
    }
}
