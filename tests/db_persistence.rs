#[cfg(test)]
mod tests {
    use ochat::config::DatabaseConfig;
    use ochat::db::models::Role;
    use ochat::db::service::{DbService, StoreError};
    use ochat::db::{connection, transcript, DbPool};

    // In memory database just for tests
    fn get_test_db() -> DbPool {
        let config = DatabaseConfig {
            path: ":memory:".to_string(),
        };
        connection::get_connection(&config).unwrap()
    }

    #[test]
    fn test_session_lifecycle() {
        let pool = get_test_db();
        let conn = pool.lock().unwrap();

        // 1. Create Session
        let session = DbService::create_session(&conn, "Test Chat").unwrap();
        assert_eq!(session.title, "Test Chat");

        // 2. Get Session
        let fetched = DbService::get_session(&conn, session.id).unwrap().unwrap();
        assert_eq!(fetched, session);

        // 3. Rename Session
        DbService::rename_session(&conn, session.id, "Renamed").unwrap();
        let renamed = DbService::get_session(&conn, session.id).unwrap().unwrap();
        assert_eq!(renamed.title, "Renamed");
        assert_eq!(renamed.created_at, session.created_at);

        // 4. Delete Session
        DbService::delete_session(&conn, session.id).unwrap();
        assert!(DbService::get_session(&conn, session.id).unwrap().is_none());
    }

    #[test]
    fn test_sessions_listed_newest_first() {
        let pool = get_test_db();
        let conn = pool.lock().unwrap();

        let first = DbService::create_session(&conn, "first").unwrap();
        let second = DbService::create_session(&conn, "second").unwrap();
        let third = DbService::create_session(&conn, "third").unwrap();
        assert!(first.id < second.id && second.id < third.id);

        let ids: Vec<_> = DbService::list_sessions(&conn).unwrap().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![third.id, second.id, first.id]);
    }

    #[test]
    fn test_messages_keep_insertion_order() {
        let pool = get_test_db();
        let conn = pool.lock().unwrap();
        let session = DbService::create_session(&conn, "ordering").unwrap();

        let script = [
            (Role::User, "one"),
            (Role::User, "two"),
            (Role::Assistant, "three"),
            (Role::Assistant, "**four**\n```\ncode\n```"),
            (Role::User, "five"),
        ];
        for (role, content) in script {
            DbService::add_message(&conn, session.id, role, content).unwrap();
        }

        let history = DbService::list_messages(&conn, session.id).unwrap();
        let got: Vec<_> = history.iter().map(|m| (m.role, m.content.as_str())).collect();
        assert_eq!(got, script.to_vec());
        assert!(history.windows(2).all(|w| w[0].id < w[1].id));
        assert!(history.iter().all(|m| m.session_id == session.id));
    }

    #[test]
    fn test_messages_are_scoped_to_their_session() {
        let pool = get_test_db();
        let conn = pool.lock().unwrap();
        let a = DbService::create_session(&conn, "a").unwrap();
        let b = DbService::create_session(&conn, "b").unwrap();

        DbService::add_message(&conn, a.id, Role::User, "for a").unwrap();
        DbService::add_message(&conn, b.id, Role::User, "for b").unwrap();
        DbService::add_message(&conn, a.id, Role::Assistant, "reply a").unwrap();

        let contents: Vec<_> = DbService::list_messages(&conn, a.id)
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["for a", "reply a"]);
    }

    #[test]
    fn test_delete_session_removes_messages() {
        let pool = get_test_db();
        let conn = pool.lock().unwrap();
        let keep = DbService::create_session(&conn, "keep").unwrap();
        let doomed = DbService::create_session(&conn, "drop").unwrap();
        DbService::add_message(&conn, keep.id, Role::User, "stay").unwrap();
        DbService::add_message(&conn, doomed.id, Role::User, "go").unwrap();
        DbService::add_message(&conn, doomed.id, Role::Assistant, "gone").unwrap();

        DbService::delete_session(&conn, doomed.id).unwrap();

        assert!(DbService::list_messages(&conn, doomed.id).unwrap().is_empty());
        let ids: Vec<_> = DbService::list_sessions(&conn).unwrap().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![keep.id]);
        assert_eq!(DbService::list_messages(&conn, keep.id).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_unknown_session_is_a_noop() {
        let pool = get_test_db();
        let conn = pool.lock().unwrap();
        let session = DbService::create_session(&conn, "still here").unwrap();

        DbService::delete_session(&conn, 9_999).unwrap();
        DbService::delete_session(&conn, session.id).unwrap();
        DbService::delete_session(&conn, session.id).unwrap();

        assert!(DbService::list_sessions(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_add_message_requires_existing_session() {
        let pool = get_test_db();
        let conn = pool.lock().unwrap();

        match DbService::add_message(&conn, 42, Role::User, "orphan") {
            Err(StoreError::UnknownSession(42)) => {}
            other => panic!("expected UnknownSession, got {:?}", other),
        }
        assert!(DbService::list_messages(&conn, 42).unwrap().is_empty());

        match DbService::rename_session(&conn, 42, "nope") {
            Err(StoreError::UnknownSession(42)) => {}
            other => panic!("expected UnknownSession, got {:?}", other),
        }
    }

    #[test]
    fn test_import_skips_system_messages() {
        let pool = get_test_db();
        let conn = pool.lock().unwrap();
        let parsed = transcript::ParsedTranscript {
            title: "with prompt".to_string(),
            messages: vec![
                (Role::System, "be terse".to_string()),
                (Role::User, "hi".to_string()),
                (Role::Assistant, "hello".to_string()),
            ],
        };

        let session = DbService::import_transcript(&conn, &parsed).unwrap();
        let roles: Vec<_> = DbService::list_messages(&conn, session.id)
            .unwrap()
            .into_iter()
            .map(|m| m.role)
            .collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
    }

    #[test]
    fn test_transcript_import_round_trip() {
        let pool = get_test_db();
        let conn = pool.lock().unwrap();
        let original = DbService::create_session(&conn, "Exported").unwrap();
        DbService::add_message(&conn, original.id, Role::User, "question\nwith two lines").unwrap();
        DbService::add_message(&conn, original.id, Role::Assistant, "answer\n---\n  indented tail\n").unwrap();

        let text = transcript::export(&original, &DbService::list_messages(&conn, original.id).unwrap());
        let imported = DbService::import_transcript(&conn, &transcript::parse(&text)).unwrap();

        assert_ne!(imported.id, original.id);
        assert_eq!(imported.title, "Exported");
        let history: Vec<_> = DbService::list_messages(&conn, imported.id)
            .unwrap()
            .into_iter()
            .map(|m| (m.role, m.content))
            .collect();
        assert_eq!(
            history,
            vec![
                (Role::User, "question\nwith two lines".to_string()),
                (Role::Assistant, "answer\n---\n  indented tail\n".to_string()),
            ]
        );
    }
}
