//! SQLite access to the game's card database.
//!
//! The database file belongs to the game. This store never changes its schema;
//! the only write it performs is the style tag update of a chunk. Audit rows
//! written alongside it go to a separately attached database.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info};

use super::models::{
    text_column, CardKey, CardQuery, CardRecord, CardSummary, CARD_RECORD_COLUMNS,
};
use super::selector::{
    self, like_pattern, Selection, SelectionCriteria, CARD_WITH_FACE_FROM, HAS_NAME_CONDITION,
    LOCALIZED_SEARCH_CONDITION, LOCALIZED_TITLES_JOIN, LOCALIZED_TITLES_TABLE, SEARCH_CONDITION,
};
use crate::batch;
use crate::error::{Result, SwapperError};
use crate::tagset::{self, StyleId};

/// How long a write into an attached database waits for its file lock.
const ATTACHED_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Direction of a style edit.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum StyleOp {
    Add,
    Remove,
}

impl StyleOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            StyleOp::Add => "add",
            StyleOp::Remove => "remove",
        }
    }
}

/// Handle to an open card database. Clones share the connection.
#[derive(Clone)]
pub struct CardStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
    /// Whether `Localizations_koKR` can be joined on `Cards.TitleId`.
    has_localized_titles: bool,
}

impl CardStore {
    /// Open an existing card database and validate it.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(SwapperError::StoreUnavailable(format!(
                "database file does not exist: {:?}",
                path
            )));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| SwapperError::StoreUnavailable(format!("{:?}: {}", path, e)))?;

        let store = Self::from_connection(conn, Some(path.to_path_buf()))?;
        info!("Opened card database at {:?}", path);
        Ok(store)
    }

    /// Wrap an already open connection, e.g. an in-memory database.
    pub fn from_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        tagset::register_functions(&conn)
            .map_err(|e| SwapperError::StoreUnavailable(e.to_string()))?;
        let mut store = Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
            has_localized_titles: false,
        };
        store.validate()?;
        store.has_localized_titles = store.detect_localized_titles()?;
        debug!("Localized titles available: {}", store.has_localized_titles);
        Ok(store)
    }

    /// Checks that the `Cards` table can be queried.
    pub fn validate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.query_row("SELECT 1 FROM Cards LIMIT 1", [], |_| Ok(()))
            .optional()
            .map_err(|e| SwapperError::StoreUnavailable(format!("validation failed: {}", e)))?;
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn detect_localized_titles(&self) -> Result<bool> {
        let conn = self.lock()?;
        let has_table: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [LOCALIZED_TITLES_TABLE],
            |r| r.get(0),
        )?;
        if !has_table {
            return Ok(false);
        }
        let has_title_id: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM pragma_table_info('Cards') WHERE name = 'TitleId')",
            [],
            |r| r.get(0),
        )?;
        Ok(has_title_id)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| SwapperError::poisoned())
    }

    pub fn count_cards(&self) -> Result<i64> {
        let conn = self.lock()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM Cards", [], |r| r.get(0))?)
    }

    pub fn get_card(&self, key: CardKey) -> Result<Option<CardRecord>> {
        let conn = self.lock()?;
        let card = conn
            .query_row(
                &format!("SELECT {} FROM Cards WHERE GrpId = ?1", CARD_RECORD_COLUMNS),
                params![key],
                CardRecord::from_row,
            )
            .optional()?;
        Ok(card)
    }

    /// Browse named cards, one entry per `(key, artwork)` pair.
    ///
    /// When the database carries Korean titles, each entry also gets its
    /// localized name and the search matches against it too.
    pub fn list_cards(&self, query: &CardQuery) -> Result<Vec<CardSummary>> {
        let (localized_column, localized_join) = if self.has_localized_titles {
            ("MAX(lko.Loc)", LOCALIZED_TITLES_JOIN)
        } else {
            ("NULL", "")
        };
        let mut sql = format!(
            "SELECT
                CASE
                    WHEN NULLIF(c1.Order_Title, '') IS NOT NULL THEN c1.Order_Title
                    ELSE c2.Order_Title || '-flip-side'
                END AS Order_Title,
                c1.ExpansionCode,
                c1.ArtSize,
                c1.GrpId,
                c1.ArtId,
                c1.IsDigitalOnly,
                c1.IsRebalanced,
                {} AS LocalizedName
            {} {} WHERE {}",
            localized_column, CARD_WITH_FACE_FROM, localized_join, HAS_NAME_CONDITION
        );
        let mut params: Vec<rusqlite::types::Value> = Vec::new();
        if let Some(search) = query.search.as_deref().map(str::trim) {
            if !search.is_empty() {
                if self.has_localized_titles {
                    sql.push_str(&format!(
                        " AND ({} OR {})",
                        SEARCH_CONDITION, LOCALIZED_SEARCH_CONDITION
                    ));
                } else {
                    sql.push_str(" AND ");
                    sql.push_str(SEARCH_CONDITION);
                }
                params.push(rusqlite::types::Value::Text(like_pattern(search)));
            }
        }
        sql.push_str(" GROUP BY c1.GrpId, c1.ArtId");
        sql.push_str(&format!(" ORDER BY {}", query.sort.order_by()));
        sql.push_str(&format!(" LIMIT {} OFFSET {}", query.limit, query.offset));

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let cards = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                let is_digital_only = row.get::<_, Option<i64>>(5)?.unwrap_or(0) != 0;
                let is_rebalanced = row.get::<_, Option<i64>>(6)?.unwrap_or(0) != 0;
                Ok(CardSummary {
                    name: text_column(row, 0)?.unwrap_or_default(),
                    set_code: text_column(row, 1)?,
                    art_size: text_column(row, 2)?,
                    key: row.get(3)?,
                    artwork_key: row.get::<_, Option<i64>>(4)?.unwrap_or_default(),
                    is_alchemy: is_digital_only || is_rebalanced,
                    localized_name: text_column(row, 7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        debug!("Card listing returned {} rows", cards.len());
        Ok(cards)
    }

    /// Resolve a selection to a deduplicated, ascending key list.
    pub fn select_keys(&self, selection: &Selection, lookup_chunk: usize) -> Result<Vec<CardKey>> {
        selection.validate()?;
        let rows = match &selection.criteria {
            SelectionCriteria::Keys(keys) => {
                if selection.exclude_basic_lands {
                    self.names_for(keys, lookup_chunk)?
                } else {
                    keys.iter().map(|k| (*k, None)).collect()
                }
            }
            criteria => {
                let Some((sql, params)) = selector::build_query(criteria) else {
                    return Ok(vec![]);
                };
                let conn = self.lock()?;
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params_from_iter(params.iter()), |row| {
                        Ok((row.get::<_, CardKey>(0)?, text_column(row, 1)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
        };
        Ok(selector::finish(rows, selection.exclude_basic_lands))
    }

    /// Names of explicitly listed keys; unknown keys are kept without a name.
    fn names_for(
        &self,
        keys: &[CardKey],
        lookup_chunk: usize,
    ) -> Result<Vec<(CardKey, Option<String>)>> {
        let conn = self.lock()?;
        let mut names = std::collections::HashMap::new();
        for chunk in batch::plan(keys, lookup_chunk)? {
            let sql = format!(
                "SELECT GrpId, Order_Title FROM Cards WHERE GrpId IN ({})",
                placeholders(chunk.len(), 1)
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                Ok((row.get::<_, CardKey>(0)?, text_column(row, 1)?))
            })?;
            for row in rows {
                let (key, name) = row?;
                names.insert(key, name);
            }
        }
        Ok(keys
            .iter()
            .map(|k| (*k, names.get(k).cloned().flatten()))
            .collect())
    }

    /// Which of `keys` currently carry `style`. Read-only, chunked by the
    /// lookup limit.
    pub fn keys_with_style(
        &self,
        keys: &[CardKey],
        style: StyleId,
        lookup_chunk: usize,
    ) -> Result<Vec<CardKey>> {
        let conn = self.lock()?;
        let mut found = Vec::new();
        for chunk in batch::plan(keys, lookup_chunk)? {
            let sql = format!(
                "SELECT GrpId FROM Cards WHERE GrpId IN ({}) AND tagset_contains(tags, ?1) \
                 ORDER BY GrpId",
                placeholders(chunk.len(), 2)
            );
            let params = std::iter::once(style as i64).chain(chunk.iter().copied());
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(params), |row| row.get::<_, CardKey>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            found.extend(rows);
        }
        found.sort_unstable();
        found.dedup();
        Ok(found)
    }

    /// Attach another database file to this connection as `schema`.
    ///
    /// Writes to it through `before_commit` of [`Self::apply_style_chunk`]
    /// then share the chunk's transaction. Attaching the same file twice is a
    /// no-op; a different file under the same name replaces the old one.
    pub fn attach(&self, path: &Path, schema: &str) -> Result<()> {
        let conn = self.lock()?;
        let attached: Option<String> = conn
            .query_row(
                "SELECT file FROM pragma_database_list WHERE name = ?1",
                [schema],
                |r| r.get(0),
            )
            .optional()?;
        match attached {
            Some(file) if same_file(Path::new(&file), path) => return Ok(()),
            Some(file) => {
                debug!("Detaching {:?} from {}", file, schema);
                conn.execute(&format!("DETACH DATABASE {}", schema), [])?;
            }
            None => {}
        }
        let file = path.to_string_lossy().into_owned();
        conn.execute(&format!("ATTACH DATABASE ?1 AS {}", schema), [&file])?;
        conn.busy_timeout(ATTACHED_BUSY_TIMEOUT)?;
        debug!("Attached {:?} as {}", path, schema);
        Ok(())
    }

    /// Apply one style edit to the rows of `chunk` as a single transaction.
    ///
    /// Only rows whose tag set actually changes are written. `before_commit`
    /// gets the open transaction and the changed keys; an error from it rolls
    /// the chunk back.
    pub fn apply_style_chunk<F>(
        &self,
        chunk: &[CardKey],
        style: StyleId,
        op: StyleOp,
        before_commit: F,
    ) -> Result<Vec<CardKey>>
    where
        F: FnOnce(&Connection, &[CardKey]) -> Result<()>,
    {
        if chunk.is_empty() {
            return Ok(vec![]);
        }
        let sql = match op {
            StyleOp::Add => format!(
                "UPDATE Cards SET tags = tagset_add(tags, ?1) \
                 WHERE GrpId IN ({}) AND NOT tagset_contains(tags, ?1) RETURNING GrpId",
                placeholders(chunk.len(), 2)
            ),
            StyleOp::Remove => format!(
                "UPDATE Cards SET tags = tagset_remove(tags, ?1) \
                 WHERE GrpId IN ({}) AND tagset_contains(tags, ?1) RETURNING GrpId",
                placeholders(chunk.len(), 2)
            ),
        };

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let changed = {
            let params = std::iter::once(style as i64).chain(chunk.iter().copied());
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(params), |row| row.get::<_, CardKey>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        before_commit(&tx, changed.as_slice())?;
        tx.commit()?;
        Ok(changed)
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// `?start, ?start+1, ...` for `count` parameters.
fn placeholders(count: usize, start: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::card_store::selector::{ColorCardinality, StructuralFilter, VEHICLE_SUBTYPE};
    use crate::tagset::PARALLAX_STYLE;

    pub(crate) const CARDS_TABLE: &str = "CREATE TABLE Cards (
        GrpId INTEGER PRIMARY KEY,
        ArtId INTEGER,
        Order_Title TEXT,
        ExpansionCode TEXT,
        ArtSize INTEGER,
        SubTypes TEXT,
        Colors TEXT,
        Rarity INTEGER,
        IsToken INTEGER,
        tags TEXT,
        LinkedFaceGrpIds TEXT,
        IsDigitalOnly INTEGER,
        IsRebalanced INTEGER
    )";

    pub(crate) fn insert_card(
        conn: &Connection,
        key: CardKey,
        name: Option<&str>,
        tags: Option<&str>,
    ) {
        conn.execute(
            "INSERT INTO Cards (GrpId, ArtId, Order_Title, ExpansionCode, ArtSize, IsToken, tags)
             VALUES (?1, ?2, ?3, 'TST', 1, 0, ?4)",
            params![key, key * 10, name, tags],
        )
        .unwrap();
    }

    pub(crate) fn create_test_store() -> CardStore {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(CARDS_TABLE, []).unwrap();
        CardStore::from_connection(conn, None).unwrap()
    }

    pub(crate) fn with_conn<T>(store: &CardStore, f: impl FnOnce(&Connection) -> T) -> T {
        let conn = store.conn.lock().unwrap();
        f(&conn)
    }

    fn tags_of(store: &CardStore, key: CardKey) -> Option<String> {
        with_conn(store, |conn| {
            conn.query_row("SELECT tags FROM Cards WHERE GrpId = ?1", [key], |r| r.get(0))
                .unwrap()
        })
    }

    #[test]
    fn test_validate_fails_without_cards_table() {
        let conn = Connection::open_in_memory().unwrap();
        let result = CardStore::from_connection(conn, None);
        assert!(matches!(result, Err(SwapperError::StoreUnavailable(_))));
    }

    #[test]
    fn test_open_missing_file_is_unavailable() {
        let result = CardStore::open("/definitely/not/here.mtga");
        assert!(matches!(result, Err(SwapperError::StoreUnavailable(_))));
    }

    #[test]
    fn test_get_card_maps_all_fields() {
        let store = create_test_store();
        with_conn(&store, |conn| {
            conn.execute(
                "INSERT INTO Cards VALUES (7, 70, 'Skysovereign', 'KLD', 1, '331', '2', 4, 0,
                 ',42,1696804317,', '8', 1, 0)",
                [],
            )
            .unwrap();
        });

        let card = store.get_card(7).unwrap().unwrap();
        assert_eq!(card.key, 7);
        assert_eq!(card.artwork_key, 70);
        assert_eq!(card.display_name.as_deref(), Some("Skysovereign"));
        assert_eq!(card.set_code.as_deref(), Some("KLD"));
        assert_eq!(card.rarity_class, Some(4));
        assert!(!card.is_token);
        assert!(card.tag_set.contains(PARALLAX_STYLE));
        assert!(card.tag_set.contains(42));
        assert_eq!(card.linked_face_key, Some(8));
        assert_eq!(card.color_count(), 1);
        assert!(card.is_alchemy());

        assert!(store.get_card(99).unwrap().is_none());
    }

    #[test]
    fn test_search_selects_by_name_case_insensitively() {
        let store = create_test_store();
        with_conn(&store, |conn| {
            insert_card(conn, 1, Some("Lightning Bolt"), None);
            insert_card(conn, 2, Some("Shock"), None);
        });

        let keys = store.select_keys(&Selection::search("bolt"), 900).unwrap();
        assert_eq!(keys, vec![1]);
        let keys = store.select_keys(&Selection::search("BOLT"), 900).unwrap();
        assert_eq!(keys, vec![1]);
    }

    #[test]
    fn test_search_matches_set_key_and_artwork() {
        let store = create_test_store();
        with_conn(&store, |conn| {
            insert_card(conn, 1, Some("Shock"), None);
            insert_card(conn, 23, Some("Opt"), None);
        });

        assert_eq!(store.select_keys(&Selection::search("tst"), 900).unwrap(), vec![1, 23]);
        assert_eq!(store.select_keys(&Selection::search("23"), 900).unwrap(), vec![23]);
        // artwork of key 1 is 10
        assert_eq!(store.select_keys(&Selection::search("10"), 900).unwrap(), vec![1]);
    }

    #[test]
    fn test_search_wildcards_are_literal() {
        let store = create_test_store();
        with_conn(&store, |conn| {
            insert_card(conn, 1, Some("Shock"), None);
            insert_card(conn, 2, Some("100% Bolt"), None);
        });
        assert_eq!(store.select_keys(&Selection::search("%"), 900).unwrap(), vec![2]);
    }

    #[test]
    fn test_search_reaches_linked_face_name() {
        let store = create_test_store();
        with_conn(&store, |conn| {
            insert_card(conn, 1, Some("Delver of Secrets"), None);
            insert_card(conn, 2, None, None);
            conn.execute("UPDATE Cards SET LinkedFaceGrpIds = '1' WHERE GrpId = 2", [])
                .unwrap();
        });
        assert_eq!(
            store.select_keys(&Selection::search("delver"), 900).unwrap(),
            vec![1, 2]
        );
    }

    #[test]
    fn test_basic_lands_excluded_only_when_requested() {
        let store = create_test_store();
        with_conn(&store, |conn| {
            insert_card(conn, 1, Some("Island"), None);
            insert_card(conn, 2, Some("Shock"), None);
            insert_card(conn, 3, Some("forest"), None);
        });

        assert_eq!(store.select_keys(&Selection::search(""), 900).unwrap(), vec![1, 2, 3]);
        assert_eq!(
            store
                .select_keys(&Selection::search("").excluding_basic_lands(), 900)
                .unwrap(),
            vec![2]
        );
        assert_eq!(
            store
                .select_keys(&Selection::keys(vec![3, 2, 1, 9]).excluding_basic_lands(), 2)
                .unwrap(),
            vec![2, 9]
        );
    }

    #[test]
    fn test_explicit_keys_pass_through_sorted_and_deduplicated() {
        let store = create_test_store();
        let keys = store
            .select_keys(&Selection::keys(vec![5, 3, 5, 100]), 900)
            .unwrap();
        assert_eq!(keys, vec![3, 5, 100]);
    }

    #[test]
    fn test_structural_colored_vehicles() {
        let store = create_test_store();
        with_conn(&store, |conn| {
            conn.execute_batch(
                "INSERT INTO Cards (GrpId, Order_Title, SubTypes, Colors, tags) VALUES
                    (1, 'Mono Vehicle', '331', '3', '1696804317'),
                    (2, 'Multi Vehicle', '331', '3,4', '1696804317'),
                    (3, 'Colorless Vehicle', '331', NULL, '1696804317'),
                    (4, 'Not A Vehicle', '1331', '3', '1696804317'),
                    (5, 'Plain Vehicle', '12,331', '5', '42');",
            )
            .unwrap();
        });

        let filter = StructuralFilter {
            subtype: Some(VEHICLE_SUBTYPE),
            colors: Some(ColorCardinality::Mono),
            with_style: Some(PARALLAX_STYLE),
            ..Default::default()
        };
        let keys = store.select_keys(&Selection::structural(filter), 900).unwrap();
        assert_eq!(keys, vec![1]);
    }

    #[test]
    fn test_structural_tokens() {
        let store = create_test_store();
        with_conn(&store, |conn| {
            conn.execute_batch(
                "INSERT INTO Cards (GrpId, Order_Title, IsToken) VALUES
                    (1, 'Soldier', 1), (2, 'Shock', 0), (3, 'Goblin', 1), (4, 'Odd', NULL);",
            )
            .unwrap();
        });
        let keys = store
            .select_keys(&Selection::structural(StructuralFilter::tokens()), 900)
            .unwrap();
        assert_eq!(keys, vec![1, 3]);
    }

    #[test]
    fn test_apply_add_only_touches_rows_missing_the_style() {
        let store = create_test_store();
        with_conn(&store, |conn| {
            insert_card(conn, 1, Some("A"), Some("42"));
            insert_card(conn, 2, Some("B"), Some("1696804317"));
            insert_card(conn, 3, Some("C"), None);
        });

        let changed = store
            .apply_style_chunk(&[1, 2, 3, 4], PARALLAX_STYLE, StyleOp::Add, |_, _| Ok(()))
            .unwrap();
        assert_eq!(changed.len(), 2);
        assert!(changed.contains(&1) && changed.contains(&3));
        assert_eq!(tags_of(&store, 1).as_deref(), Some("42,1696804317"));
        assert_eq!(tags_of(&store, 2).as_deref(), Some("1696804317"));
        assert_eq!(tags_of(&store, 3).as_deref(), Some("1696804317"));
    }

    #[test]
    fn test_apply_remove_normalizes_legacy_delimiters() {
        let store = create_test_store();
        with_conn(&store, |conn| {
            insert_card(conn, 1, Some("A"), Some(",1696804317,"));
            insert_card(conn, 2, Some("B"), Some("5,1696804317,7"));
            insert_card(conn, 3, Some("C"), Some("16968043170"));
        });

        let changed = store
            .apply_style_chunk(&[1, 2, 3], PARALLAX_STYLE, StyleOp::Remove, |_, _| Ok(()))
            .unwrap();
        assert_eq!(changed.len(), 2);
        assert_eq!(tags_of(&store, 1).as_deref(), Some(""));
        assert_eq!(tags_of(&store, 2).as_deref(), Some("5,7"));
        assert_eq!(tags_of(&store, 3).as_deref(), Some("16968043170"));
    }

    #[test]
    fn test_before_commit_error_rolls_back() {
        let store = create_test_store();
        with_conn(&store, |conn| insert_card(conn, 1, Some("A"), Some("42")));

        let result = store.apply_style_chunk(&[1], 7, StyleOp::Add, |_, changed| {
            assert_eq!(changed, &[1]);
            Err(SwapperError::Audit("log is read-only".to_string()))
        });
        assert!(matches!(result, Err(SwapperError::Audit(_))));
        assert_eq!(tags_of(&store, 1).as_deref(), Some("42"));
    }

    #[test]
    fn test_attached_writes_share_the_chunk_transaction() {
        let dir = tempfile::TempDir::new().unwrap();
        let side = dir.path().join("side.db");
        Connection::open(&side)
            .unwrap()
            .execute("CREATE TABLE seen (key INTEGER)", [])
            .unwrap();
        let store = create_test_store();
        with_conn(&store, |conn| {
            insert_card(conn, 1, Some("A"), None);
            insert_card(conn, 2, Some("B"), None);
        });
        store.attach(&side, "side").unwrap();
        store.attach(&side, "side").unwrap();

        let record = |conn: &Connection, changed: &[CardKey]| -> Result<()> {
            for key in changed {
                conn.execute("INSERT INTO side.seen (key) VALUES (?1)", [key])?;
            }
            Ok(())
        };
        store.apply_style_chunk(&[1], 7, StyleOp::Add, record).unwrap();
        let failed = store.apply_style_chunk(&[2], 7, StyleOp::Add, |conn, changed| {
            record(conn, changed)?;
            Err(SwapperError::Audit("rejected".to_string()))
        });
        assert!(failed.is_err());

        let seen: Vec<i64> = Connection::open(&side)
            .unwrap()
            .prepare("SELECT key FROM seen ORDER BY key")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(seen, vec![1]);
        assert_eq!(tags_of(&store, 2), None);
    }

    #[test]
    fn test_keys_with_style_uses_whole_ids() {
        let store = create_test_store();
        with_conn(&store, |conn| {
            insert_card(conn, 1, Some("A"), Some("1696804317"));
            insert_card(conn, 2, Some("B"), Some("16968043170"));
            insert_card(conn, 3, Some("C"), Some("3,1696804317"));
        });
        let found = store
            .keys_with_style(&[3, 2, 1], PARALLAX_STYLE, 2)
            .unwrap();
        assert_eq!(found, vec![1, 3]);
    }

    #[test]
    fn test_list_cards_flip_side_and_alchemy() {
        let store = create_test_store();
        with_conn(&store, |conn| {
            insert_card(conn, 1, Some("Bolt"), None);
            insert_card(conn, 2, None, None);
            conn.execute(
                "UPDATE Cards SET LinkedFaceGrpIds = '1', IsRebalanced = 1 WHERE GrpId = 2",
                [],
            )
            .unwrap();
            insert_card(conn, 3, None, None);
        });

        let cards = store
            .list_cards(&CardQuery {
                sort: crate::card_store::CardSort::Key,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].name, "Bolt");
        assert!(!cards[0].is_alchemy);
        assert_eq!(cards[1].name, "Bolt-flip-side");
        assert!(cards[1].is_alchemy);
        assert_eq!(cards[1].artwork_key, 20);
    }

    #[test]
    fn test_list_cards_paginates() {
        let store = create_test_store();
        with_conn(&store, |conn| {
            for key in 1..=5 {
                insert_card(conn, key, Some(&format!("Card {}", key)), None);
            }
        });
        let page = store
            .list_cards(&CardQuery {
                search: Some("card".to_string()),
                limit: 2,
                offset: 2,
                sort: crate::card_store::CardSort::Key,
            })
            .unwrap();
        assert_eq!(page.iter().map(|c| c.key).collect::<Vec<_>>(), vec![3, 4]);
    }

    fn create_localized_test_store() -> CardStore {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(CARDS_TABLE, []).unwrap();
        conn.execute("ALTER TABLE Cards ADD COLUMN TitleId INTEGER", [])
            .unwrap();
        conn.execute(
            "CREATE TABLE Localizations_koKR (LocId INTEGER, Formatted INTEGER, Loc TEXT)",
            [],
        )
        .unwrap();
        CardStore::from_connection(conn, None).unwrap()
    }

    #[test]
    fn test_list_cards_without_localizations_has_no_localized_name() {
        let store = create_test_store();
        assert!(!store.has_localized_titles);
        with_conn(&store, |conn| insert_card(conn, 1, Some("Forest"), None));
        let cards = store.list_cards(&CardQuery::default()).unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].localized_name, None);
    }

    #[test]
    fn test_list_cards_joins_korean_titles() {
        let store = create_localized_test_store();
        assert!(store.has_localized_titles);
        with_conn(&store, |conn| {
            insert_card(conn, 1, Some("Forest"), None);
            insert_card(conn, 2, Some("Island"), None);
            conn.execute("UPDATE Cards SET TitleId = GrpId + 100", [])
                .unwrap();
            conn.execute(
                "INSERT INTO Localizations_koKR (LocId, Formatted, Loc) VALUES
                    (101, 0, '숲'), (101, 1, '숲'), (102, 0, '섬')",
                [],
            )
            .unwrap();
        });

        let cards = store
            .list_cards(&CardQuery {
                sort: crate::card_store::CardSort::Key,
                ..CardQuery::default()
            })
            .unwrap();
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].localized_name.as_deref(), Some("숲"));
        assert_eq!(cards[1].localized_name.as_deref(), Some("섬"));

        let found = store
            .list_cards(&CardQuery {
                search: Some("섬".to_string()),
                ..CardQuery::default()
            })
            .unwrap();
        assert_eq!(found.iter().map(|c| c.key).collect::<Vec<_>>(), vec![2]);

        let by_english = store
            .list_cards(&CardQuery {
                search: Some("forest".to_string()),
                ..CardQuery::default()
            })
            .unwrap();
        assert_eq!(by_english.iter().map(|c| c.key).collect::<Vec<_>>(), vec![1]);
    }
}
