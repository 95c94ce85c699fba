use crate::Database;
use crate::models::{
    AttachmentRow, ConnectOutcome, ConnectionRequestRow, CreditRow, FileRow, GateOutcome,
    MessageRow, NewAttachment, ThreadListRow, ThreadRow, UserRow,
};
use anyhow::Result;
use parley_types::models::Role;
use rusqlite::{Connection, params};

/// Conditional spend of one connect credit. Affected-row count tells the
/// caller whether the balance covered it; check-and-spend is one statement.
const SPEND_CONNECT_SQL: &str =
    "UPDATE credits SET connect_credits = connect_credits - 1
      WHERE user_id = ?1 AND connect_credits >= 1";

const SPEND_INVITE_SQL: &str =
    "UPDATE credits SET invite_credits = invite_credits - 1
      WHERE user_id = ?1 AND invite_credits >= 1";

const SPEND_BID_SQL: &str =
    "UPDATE credits SET bid_credits = bid_credits - 1
      WHERE user_id = ?1 AND bid_credits >= 1";

impl Database {
    // -- Users --

    /// Creates the user plus their initial role-based credit grant in one
    /// transaction.
    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        display_name: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<()> {
        let (connect, invite, bid) = role.initial_credits();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO users (id, username, display_name, password, role)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, username, display_name, password_hash, role.as_str()],
            )?;
            tx.execute(
                "INSERT INTO credits (user_id, connect_credits, invite_credits, bid_credits)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, connect, invite, bid],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            query_user(conn, "SELECT id, username, display_name, password, role, last_online, created_at FROM users WHERE username = ?1", username)
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            query_user(conn, "SELECT id, username, display_name, password, role, last_online, created_at FROM users WHERE id = ?1", id)
        })
    }

    /// Presence marker, refreshed by the owner's own authenticated requests.
    pub fn touch_last_online(&self, id: &str, now: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET last_online = ?1 WHERE id = ?2",
                params![now, id],
            )?;
            Ok(())
        })
    }

    // -- Credits --

    pub fn credit_balances(&self, user_id: &str) -> Result<Option<CreditRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT user_id, connect_credits, invite_credits, bid_credits
                   FROM credits WHERE user_id = ?1",
                [user_id],
                |row| {
                    Ok(CreditRow {
                        user_id: row.get(0)?,
                        connect_credits: row.get(1)?,
                        invite_credits: row.get(2)?,
                        bid_credits: row.get(3)?,
                    })
                },
            )
            .optional()
        })
    }

    /// Additive top-up of a user's counters (operator-driven; no scheduler
    /// runs in-process).
    pub fn grant_credits(&self, user_id: &str, connect: i64, invite: i64, bid: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE credits
                    SET connect_credits = connect_credits + ?2,
                        invite_credits  = invite_credits  + ?3,
                        bid_credits     = bid_credits     + ?4
                  WHERE user_id = ?1",
                params![user_id, connect, invite, bid],
            )?;
            Ok(())
        })
    }

    /// Spend one invite credit if the balance covers it. Returns whether it
    /// was spent.
    pub fn spend_invite_credit(&self, user_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| Ok(conn.execute(SPEND_INVITE_SQL, [user_id])? > 0))
    }

    /// Spend one bid credit if the balance covers it.
    pub fn spend_bid_credit(&self, user_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| Ok(conn.execute(SPEND_BID_SQL, [user_id])? > 0))
    }

    // -- Threads --

    pub fn find_thread_for_pair(&self, a: &str, b: &str) -> Result<Option<ThreadRow>> {
        self.with_conn(|conn| query_thread_for_pair(conn, a, b))
    }

    pub fn get_thread(&self, id: i64) -> Result<Option<ThreadRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {THREAD_COLUMNS} FROM threads WHERE id = ?1"),
                [id],
                map_thread_row,
            )
            .optional()
        })
    }

    /// The thread/credit gate. Returns the existing thread for the pair
    /// without charge, or creates one after conditionally spending one of
    /// the initiator's connect credits. Lookup, spend, and insert run in a
    /// single transaction.
    pub fn open_thread(&self, initiator: &str, counterpart: &str, now: i64) -> Result<GateOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if let Some(existing) = query_thread_for_pair(&tx, initiator, counterpart)? {
                return Ok(GateOutcome::Existing(existing.id));
            }

            if tx.execute(SPEND_CONNECT_SQL, [initiator])? == 0 {
                return Ok(GateOutcome::InsufficientCredit);
            }

            tx.execute(
                "INSERT INTO threads (user_a, user_b, created_at, last_updated)
                 VALUES (?1, ?2, ?3, ?3)",
                params![initiator, counterpart, now],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;
            Ok(GateOutcome::Created(id))
        })
    }

    pub fn set_meeting_link(&self, thread_id: i64, url: &str, issued_at: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE threads SET meeting_url = ?1, meeting_issued_at = ?2 WHERE id = ?3",
                params![url, issued_at, thread_id],
            )?;
            Ok(())
        })
    }

    /// Thread listing for a user, most recently updated first, with the
    /// counterpart, unread count, and last-message preview resolved in one
    /// query. An optional search term filters by counterpart username,
    /// display name, or message body (case-insensitive substring).
    pub fn list_threads(&self, user_id: &str, search: Option<&str>) -> Result<Vec<ThreadListRow>> {
        self.with_conn(|conn| {
            let base = r"
                SELECT t.id, t.last_updated, t.meeting_url, t.meeting_issued_at,
                       u.id, u.username, u.display_name, u.last_online,
                       (SELECT COUNT(*) FROM messages m
                         WHERE m.thread_id = t.id AND m.recipient_id = ?1 AND m.is_read = 0),
                       (SELECT m.sender_id  FROM messages m WHERE m.thread_id = t.id ORDER BY m.id DESC LIMIT 1),
                       (SELECT m.body       FROM messages m WHERE m.thread_id = t.id ORDER BY m.id DESC LIMIT 1),
                       (SELECT m.created_at FROM messages m WHERE m.thread_id = t.id ORDER BY m.id DESC LIMIT 1)
                  FROM threads t
                  JOIN users u ON u.id = CASE WHEN t.user_a = ?1 THEN t.user_b ELSE t.user_a END
                 WHERE (t.user_a = ?1 OR t.user_b = ?1)";

            let filter = r"
                   AND (u.username     LIKE ?2 ESCAPE '\'
                     OR u.display_name LIKE ?2 ESCAPE '\'
                     OR EXISTS (SELECT 1 FROM messages m
                                 WHERE m.thread_id = t.id AND m.body LIKE ?2 ESCAPE '\'))";

            let order = " ORDER BY t.last_updated DESC, t.id DESC";

            let rows = match search {
                Some(term) if !term.is_empty() => {
                    let sql = format!("{base}{filter}{order}");
                    let mut stmt = conn.prepare(&sql)?;
                    stmt.query_map(params![user_id, like_pattern(term)], map_thread_list_row)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
                _ => {
                    let sql = format!("{base}{order}");
                    let mut stmt = conn.prepare(&sql)?;
                    stmt.query_map([user_id], map_thread_list_row)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
            };

            Ok(rows)
        })
    }

    // -- Messages --

    /// Appends a message with its attachment rows and stamps the thread's
    /// last_updated, all in one transaction. Returns the new message id.
    pub fn insert_message(
        &self,
        thread_id: i64,
        sender_id: &str,
        recipient_id: &str,
        body: &str,
        attachments: &[NewAttachment],
        now: i64,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO messages (thread_id, sender_id, recipient_id, body, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![thread_id, sender_id, recipient_id, body, now],
            )?;
            let id = tx.last_insert_rowid();

            for a in attachments {
                tx.execute(
                    "INSERT INTO attachments (message_id, url, name, mime_type)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![id, a.url, a.name, a.mime_type],
                )?;
            }

            tx.execute(
                "UPDATE threads SET last_updated = ?1 WHERE id = ?2",
                params![now, thread_id],
            )?;
            tx.commit()?;
            Ok(id)
        })
    }

    pub fn get_message(&self, id: i64) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                [id],
                map_message_row,
            )
            .optional()
        })
    }

    /// Polling read: rows with id above the watermark, ascending id order.
    /// Side effect: rows addressed to the requester are marked read first
    /// (recipient-only marking; the sender polling never flips flags).
    pub fn messages_after(
        &self,
        thread_id: i64,
        requester_id: &str,
        after: i64,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE messages SET is_read = 1
                  WHERE thread_id = ?1 AND id > ?2 AND recipient_id = ?3 AND is_read = 0",
                params![thread_id, after, requester_id],
            )?;

            let rows = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                      WHERE thread_id = ?1 AND id > ?2
                      ORDER BY id ASC"
                ))?;
                stmt.query_map(params![thread_id, after], map_message_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };

            tx.commit()?;
            Ok(rows)
        })
    }

    /// Batch-fetch attachments for a set of message ids.
    pub fn attachments_for_messages(&self, message_ids: &[i64]) -> Result<Vec<AttachmentRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT id, message_id, url, name, mime_type FROM attachments
                  WHERE message_id IN ({}) ORDER BY id ASC",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let sql_params: Vec<&dyn rusqlite::types::ToSql> = message_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(sql_params.as_slice(), |row| {
                    Ok(AttachmentRow {
                        id: row.get(0)?,
                        message_id: row.get(1)?,
                        url: row.get(2)?,
                        name: row.get(3)?,
                        mime_type: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Connection requests --

    /// Sends a connection request: rejects duplicates (pending or accepted,
    /// either direction), then conditionally spends one connect credit
    /// before inserting. One transaction.
    pub fn create_connection_request(
        &self,
        sender_id: &str,
        receiver_id: &str,
        now: i64,
    ) -> Result<ConnectOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let existing: Option<String> = tx
                .query_row(
                    "SELECT status FROM connection_requests
                      WHERE ((sender_id = ?1 AND receiver_id = ?2)
                          OR (sender_id = ?2 AND receiver_id = ?1))
                        AND status IN ('pending', 'accepted')
                      LIMIT 1",
                    params![sender_id, receiver_id],
                    |row| row.get(0),
                )
                .optional()?;

            if existing.is_some() {
                return Ok(ConnectOutcome::Duplicate);
            }

            if tx.execute(SPEND_CONNECT_SQL, [sender_id])? == 0 {
                return Ok(ConnectOutcome::InsufficientCredit);
            }

            tx.execute(
                "INSERT INTO connection_requests (sender_id, receiver_id, status, created_at)
                 VALUES (?1, ?2, 'pending', ?3)",
                params![sender_id, receiver_id, now],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;
            Ok(ConnectOutcome::Sent(id))
        })
    }

    /// Accept or reject a pending request. Only the addressed receiver may
    /// respond; returns false when no matching pending request exists.
    pub fn respond_connection_request(
        &self,
        request_id: i64,
        receiver_id: &str,
        accept: bool,
        now: i64,
    ) -> Result<bool> {
        let status = if accept { "accepted" } else { "rejected" };
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE connection_requests
                    SET status = ?1, responded_at = ?2
                  WHERE id = ?3 AND receiver_id = ?4 AND status = 'pending'",
                params![status, now, request_id, receiver_id],
            )?;
            Ok(n > 0)
        })
    }

    /// Pending requests involving a user: (incoming, outgoing), newest first.
    pub fn pending_connection_requests(
        &self,
        user_id: &str,
    ) -> Result<(Vec<ConnectionRequestRow>, Vec<ConnectionRequestRow>)> {
        self.with_conn(|conn| {
            let incoming = query_pending_requests(
                conn,
                "SELECT id, sender_id, receiver_id, status, created_at, responded_at
                   FROM connection_requests
                  WHERE receiver_id = ?1 AND status = 'pending'
                  ORDER BY created_at DESC, id DESC",
                user_id,
            )?;
            let outgoing = query_pending_requests(
                conn,
                "SELECT id, sender_id, receiver_id, status, created_at, responded_at
                   FROM connection_requests
                  WHERE sender_id = ?1 AND status = 'pending'
                  ORDER BY created_at DESC, id DESC",
                user_id,
            )?;
            Ok((incoming, outgoing))
        })
    }

    // -- Files --

    pub fn insert_file(
        &self,
        id: &str,
        owner_id: &str,
        name: &str,
        mime_type: &str,
        size: i64,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO files (id, owner_id, name, mime_type, size)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, owner_id, name, mime_type, size],
            )?;
            Ok(())
        })
    }

    pub fn get_file(&self, id: &str) -> Result<Option<FileRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, owner_id, name, mime_type, size, created_at FROM files WHERE id = ?1",
                [id],
                |row| {
                    Ok(FileRow {
                        id: row.get(0)?,
                        owner_id: row.get(1)?,
                        name: row.get(2)?,
                        mime_type: row.get(3)?,
                        size: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()
        })
    }
}

const THREAD_COLUMNS: &str =
    "id, user_a, user_b, created_at, last_updated, meeting_url, meeting_issued_at";

const MESSAGE_COLUMNS: &str =
    "id, thread_id, sender_id, recipient_id, body, created_at, is_read";

fn map_thread_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ThreadRow> {
    Ok(ThreadRow {
        id: row.get(0)?,
        user_a: row.get(1)?,
        user_b: row.get(2)?,
        created_at: row.get(3)?,
        last_updated: row.get(4)?,
        meeting_url: row.get(5)?,
        meeting_issued_at: row.get(6)?,
    })
}

fn map_thread_list_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ThreadListRow> {
    Ok(ThreadListRow {
        id: row.get(0)?,
        last_updated: row.get(1)?,
        meeting_url: row.get(2)?,
        meeting_issued_at: row.get(3)?,
        counterpart_id: row.get(4)?,
        counterpart_username: row.get(5)?,
        counterpart_display_name: row.get(6)?,
        counterpart_last_online: row.get(7)?,
        unread_count: row.get(8)?,
        last_message_sender: row.get(9)?,
        last_message_body: row.get(10)?,
        last_message_at: row.get(11)?,
    })
}

fn map_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        thread_id: row.get(1)?,
        sender_id: row.get(2)?,
        recipient_id: row.get(3)?,
        body: row.get(4)?,
        created_at: row.get(5)?,
        is_read: row.get(6)?,
    })
}

fn query_user(conn: &Connection, sql: &str, key: &str) -> Result<Option<UserRow>> {
    conn.query_row(sql, [key], |row| {
        Ok(UserRow {
            id: row.get(0)?,
            username: row.get(1)?,
            display_name: row.get(2)?,
            password: row.get(3)?,
            role: row.get(4)?,
            last_online: row.get(5)?,
            created_at: row.get(6)?,
        })
    })
    .optional()
}

/// Unordered-pair lookup: the pair is stored in initiation order, so both
/// column orders must be checked.
fn query_thread_for_pair(conn: &Connection, a: &str, b: &str) -> Result<Option<ThreadRow>> {
    conn.query_row(
        &format!(
            "SELECT {THREAD_COLUMNS} FROM threads
              WHERE (user_a = ?1 AND user_b = ?2) OR (user_a = ?2 AND user_b = ?1)"
        ),
        params![a, b],
        map_thread_row,
    )
    .optional()
}

fn query_pending_requests(
    conn: &Connection,
    sql: &str,
    user_id: &str,
) -> Result<Vec<ConnectionRequestRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([user_id], |row| {
            Ok(ConnectionRequestRow {
                id: row.get(0)?,
                sender_id: row.get(1)?,
                receiver_id: row.get(2)?,
                status: row.get(3)?,
                created_at: row.get(4)?,
                responded_at: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Escape LIKE wildcards in a user-supplied search term, then wrap it for
/// substring matching.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn mk_user(db: &Database, username: &str, role: Role) -> String {
        let id = Uuid::new_v4().to_string();
        db.create_user(&id, username, username, "hash", role).unwrap();
        id
    }

    fn connect_balance(db: &Database, id: &str) -> i64 {
        db.credit_balances(id).unwrap().unwrap().connect_credits
    }

    fn drain_connect_credits(db: &Database, id: &str) {
        db.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE credits SET connect_credits = 0 WHERE user_id = ?1",
                [id],
            )?;
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn registration_grants_role_allotment() {
        let db = test_db();
        let inv = mk_user(&db, "ada", Role::Investor);
        let balances = db.credit_balances(&inv).unwrap().unwrap();
        assert_eq!(
            (
                balances.connect_credits,
                balances.invite_credits,
                balances.bid_credits
            ),
            (10, 5, 20)
        );
    }

    #[test]
    fn gate_charges_only_on_creation() {
        let db = test_db();
        let a = mk_user(&db, "ada", Role::Investor);
        let b = mk_user(&db, "bob", Role::Freelancer);

        let first = db.open_thread(&a, &b, 100).unwrap();
        let GateOutcome::Created(thread_id) = first else {
            panic!("expected Created, got {:?}", first)
        };
        assert_eq!(connect_balance(&db, &a), 9);

        // Same initiator again: no second thread, no second charge.
        assert_eq!(
            db.open_thread(&a, &b, 200).unwrap(),
            GateOutcome::Existing(thread_id)
        );
        assert_eq!(connect_balance(&db, &a), 9);

        // Reverse direction finds the same thread and charges b nothing.
        assert_eq!(
            db.open_thread(&b, &a, 300).unwrap(),
            GateOutcome::Existing(thread_id)
        );
        assert_eq!(connect_balance(&db, &b), 15);
    }

    #[test]
    fn gate_rejects_without_credit_and_creates_nothing() {
        let db = test_db();
        let a = mk_user(&db, "ada", Role::Investor);
        let b = mk_user(&db, "bob", Role::Freelancer);
        drain_connect_credits(&db, &a);

        assert_eq!(
            db.open_thread(&a, &b, 100).unwrap(),
            GateOutcome::InsufficientCredit
        );
        assert!(db.find_thread_for_pair(&a, &b).unwrap().is_none());

        let count: i64 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM threads", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn poll_respects_watermark_and_id_order() {
        let db = test_db();
        let a = mk_user(&db, "ada", Role::Investor);
        let b = mk_user(&db, "bob", Role::Freelancer);
        let GateOutcome::Created(tid) = db.open_thread(&a, &b, 100).unwrap() else {
            panic!()
        };

        let m1 = db.insert_message(tid, &a, &b, "one", &[], 101).unwrap();
        let m2 = db.insert_message(tid, &b, &a, "two", &[], 102).unwrap();
        let m3 = db.insert_message(tid, &a, &b, "three", &[], 103).unwrap();
        assert!(m1 < m2 && m2 < m3);

        let rows = db.messages_after(tid, &b, m1).unwrap();
        let ids: Vec<i64> = rows.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![m2, m3]);
        assert!(rows.iter().all(|m| m.id > m1));

        assert!(db.messages_after(tid, &b, m3).unwrap().is_empty());
    }

    #[test]
    fn poll_marks_read_for_recipient_only() {
        let db = test_db();
        let a = mk_user(&db, "ada", Role::Investor);
        let b = mk_user(&db, "bob", Role::Freelancer);
        let GateOutcome::Created(tid) = db.open_thread(&a, &b, 100).unwrap() else {
            panic!()
        };
        let mid = db.insert_message(tid, &a, &b, "hello", &[], 101).unwrap();

        // Sender polling does not flip the flag on messages addressed to b.
        db.messages_after(tid, &a, 0).unwrap();
        assert!(!db.get_message(mid).unwrap().unwrap().is_read);

        // Recipient polling does.
        let rows = db.messages_after(tid, &b, 0).unwrap();
        assert!(rows[0].is_read);
        assert!(db.get_message(mid).unwrap().unwrap().is_read);
    }

    #[test]
    fn message_attachments_round_trip() {
        let db = test_db();
        let a = mk_user(&db, "ada", Role::Investor);
        let b = mk_user(&db, "bob", Role::Freelancer);
        let GateOutcome::Created(tid) = db.open_thread(&a, &b, 100).unwrap() else {
            panic!()
        };

        let atts = vec![
            NewAttachment {
                url: "/files/abc".into(),
                name: "pitch.pdf".into(),
                mime_type: "application/pdf".into(),
            },
            NewAttachment {
                url: "/files/def".into(),
                name: "logo.png".into(),
                mime_type: "image/png".into(),
            },
        ];
        let mid = db.insert_message(tid, &a, &b, "", &atts, 101).unwrap();

        let fetched = db.attachments_for_messages(&[mid]).unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[0].name, "pitch.pdf");
        assert_eq!(fetched[1].mime_type, "image/png");
        assert!(fetched.iter().all(|a| a.message_id == mid));
    }

    #[test]
    fn insert_message_stamps_thread_last_updated() {
        let db = test_db();
        let a = mk_user(&db, "ada", Role::Investor);
        let b = mk_user(&db, "bob", Role::Freelancer);
        let GateOutcome::Created(tid) = db.open_thread(&a, &b, 100).unwrap() else {
            panic!()
        };

        db.insert_message(tid, &a, &b, "hi", &[], 555).unwrap();
        assert_eq!(db.get_thread(tid).unwrap().unwrap().last_updated, 555);
    }

    #[test]
    fn listing_orders_by_recency_and_counts_unread() {
        let db = test_db();
        let a = mk_user(&db, "ada", Role::Investor);
        let b = mk_user(&db, "bob", Role::Freelancer);
        let c = mk_user(&db, "carol", Role::Professional);

        let GateOutcome::Created(t_ab) = db.open_thread(&a, &b, 100).unwrap() else {
            panic!()
        };
        let GateOutcome::Created(t_ac) = db.open_thread(&a, &c, 200).unwrap() else {
            panic!()
        };
        db.insert_message(t_ab, &b, &a, "from bob", &[], 300).unwrap();
        db.insert_message(t_ab, &b, &a, "again", &[], 301).unwrap();
        db.insert_message(t_ac, &c, &a, "from carol", &[], 250).unwrap();

        let rows = db.list_threads(&a, None).unwrap();
        assert_eq!(rows.len(), 2);
        // t_ab was updated last, so it leads.
        assert_eq!(rows[0].id, t_ab);
        assert_eq!(rows[0].unread_count, 2);
        assert_eq!(rows[0].last_message_body.as_deref(), Some("again"));
        assert_eq!(rows[1].id, t_ac);
        assert_eq!(rows[1].unread_count, 1);
        assert_eq!(rows[1].counterpart_username, "carol");
    }

    #[test]
    fn search_matches_username_and_body_case_insensitively() {
        let db = test_db();
        let a = mk_user(&db, "ada", Role::Investor);
        let b = mk_user(&db, "bobby", Role::Freelancer);
        let c = mk_user(&db, "carol", Role::Professional);

        let GateOutcome::Created(t_ab) = db.open_thread(&a, &b, 100).unwrap() else {
            panic!()
        };
        let GateOutcome::Created(t_ac) = db.open_thread(&a, &c, 200).unwrap() else {
            panic!()
        };
        db.insert_message(t_ab, &a, &b, "let's talk Funding", &[], 300)
            .unwrap();
        db.insert_message(t_ac, &a, &c, "hello there", &[], 301).unwrap();

        // Counterpart username substring.
        let rows = db.list_threads(&a, Some("OBB")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, t_ab);

        // Message body substring, case-insensitive.
        let rows = db.list_threads(&a, Some("funding")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, t_ab);

        // LIKE wildcards in the term are literal.
        assert!(db.list_threads(&a, Some("%")).unwrap().is_empty());

        // No match.
        assert!(db.list_threads(&a, Some("zzz")).unwrap().is_empty());
    }

    #[test]
    fn connection_request_spends_credit_and_blocks_duplicates() {
        let db = test_db();
        let a = mk_user(&db, "ada", Role::Investor);
        let b = mk_user(&db, "bob", Role::Freelancer);

        let sent = db.create_connection_request(&a, &b, 100).unwrap();
        let ConnectOutcome::Sent(req_id) = sent else {
            panic!("expected Sent, got {:?}", sent)
        };
        assert_eq!(connect_balance(&db, &a), 9);

        // Duplicate in the same direction.
        assert_eq!(
            db.create_connection_request(&a, &b, 200).unwrap(),
            ConnectOutcome::Duplicate
        );
        // And in the opposite direction while pending.
        assert_eq!(
            db.create_connection_request(&b, &a, 200).unwrap(),
            ConnectOutcome::Duplicate
        );
        assert_eq!(connect_balance(&db, &a), 9);

        // Accepting keeps the pair blocked.
        assert!(db.respond_connection_request(req_id, &b, true, 300).unwrap());
        assert_eq!(
            db.create_connection_request(&a, &b, 400).unwrap(),
            ConnectOutcome::Duplicate
        );
    }

    #[test]
    fn connection_request_rejected_without_credit() {
        let db = test_db();
        let a = mk_user(&db, "ada", Role::Investor);
        let b = mk_user(&db, "bob", Role::Freelancer);
        drain_connect_credits(&db, &a);

        assert_eq!(
            db.create_connection_request(&a, &b, 100).unwrap(),
            ConnectOutcome::InsufficientCredit
        );
        let (incoming, _) = db.pending_connection_requests(&b).unwrap();
        assert!(incoming.is_empty());
    }

    #[test]
    fn only_the_receiver_can_respond() {
        let db = test_db();
        let a = mk_user(&db, "ada", Role::Investor);
        let b = mk_user(&db, "bob", Role::Freelancer);
        let ConnectOutcome::Sent(req_id) = db.create_connection_request(&a, &b, 100).unwrap()
        else {
            panic!()
        };

        // Sender cannot accept their own request.
        assert!(!db.respond_connection_request(req_id, &a, true, 200).unwrap());

        assert!(db.respond_connection_request(req_id, &b, false, 200).unwrap());
        // Already responded: a second response is a no-op.
        assert!(!db.respond_connection_request(req_id, &b, true, 300).unwrap());
    }

    #[test]
    fn pending_listing_splits_directions() {
        let db = test_db();
        let a = mk_user(&db, "ada", Role::Investor);
        let b = mk_user(&db, "bob", Role::Freelancer);
        let c = mk_user(&db, "carol", Role::Professional);

        db.create_connection_request(&a, &b, 100).unwrap();
        db.create_connection_request(&c, &a, 200).unwrap();

        let (incoming, outgoing) = db.pending_connection_requests(&a).unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].sender_id, c);
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].receiver_id, b);
    }

    #[test]
    fn invite_spend_is_conditional() {
        let db = test_db();
        let a = mk_user(&db, "ada", Role::Freelancer); // 3 invite credits

        assert!(db.spend_invite_credit(&a).unwrap());
        assert!(db.spend_invite_credit(&a).unwrap());
        assert!(db.spend_invite_credit(&a).unwrap());
        assert!(!db.spend_invite_credit(&a).unwrap());
        assert_eq!(
            db.credit_balances(&a).unwrap().unwrap().invite_credits,
            0
        );
    }

    #[test]
    fn bid_spend_is_conditional() {
        let db = test_db();
        let a = mk_user(&db, "ada", Role::Investor); // 20 bid credits
        for _ in 0..20 {
            assert!(db.spend_bid_credit(&a).unwrap());
        }
        assert!(!db.spend_bid_credit(&a).unwrap());
        assert_eq!(db.credit_balances(&a).unwrap().unwrap().bid_credits, 0);
    }

    #[test]
    fn grant_tops_up_counters() {
        let db = test_db();
        let a = mk_user(&db, "ada", Role::Investor);
        db.grant_credits(&a, 5, 1, 0).unwrap();
        let balances = db.credit_balances(&a).unwrap().unwrap();
        assert_eq!(balances.connect_credits, 15);
        assert_eq!(balances.invite_credits, 6);
        assert_eq!(balances.bid_credits, 20);
    }

    #[test]
    fn meeting_link_round_trips() {
        let db = test_db();
        let a = mk_user(&db, "ada", Role::Investor);
        let b = mk_user(&db, "bob", Role::Freelancer);
        let GateOutcome::Created(tid) = db.open_thread(&a, &b, 100).unwrap() else {
            panic!()
        };

        db.set_meeting_link(tid, "https://meet.example/j/123", 500).unwrap();
        let thread = db.get_thread(tid).unwrap().unwrap();
        assert_eq!(
            thread.meeting_url.as_deref(),
            Some("https://meet.example/j/123")
        );
        assert_eq!(thread.meeting_issued_at, Some(500));
    }
}
