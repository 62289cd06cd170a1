use boxtrack_core::db::{open_db, open_db_in_memory};
use boxtrack_core::{
    BoxListQuery, BoxPatch, BoxRecord, BoxService, CoreError, CoreResult, EntityRef, NewBox,
    ParentFilter, ShortId, ShortIdRange, SqliteBoxRepository,
};
use rusqlite::Connection;
use std::sync::{Arc, Barrier};
use std::thread;
use uuid::Uuid;

fn service(conn: &Connection) -> BoxService<SqliteBoxRepository<'_>> {
    BoxService::new(SqliteBoxRepository::try_new(conn).unwrap())
}

fn create(
    service: &BoxService<SqliteBoxRepository<'_>>,
    short_id: &str,
    parent: Option<&BoxRecord>,
) -> BoxRecord {
    service
        .create_box(NewBox {
            short_id: Some(ShortId::parse(short_id).unwrap()),
            label: Some(format!("Box {short_id}")),
            parent_uuid: parent.map(|record| record.box_uuid),
            ..NewBox::default()
        })
        .unwrap()
}

fn parent_of(service: &BoxService<SqliteBoxRepository<'_>>, record: &BoxRecord) -> Option<Uuid> {
    service.require_box(record.box_uuid).unwrap().parent_uuid
}

#[test]
fn reparent_under_descendant_is_rejected_and_nothing_changes() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let a = create(&service, "100", None);
    let b = create(&service, "101", Some(&a));
    let c = create(&service, "102", Some(&b));

    let err = service.reparent_box(a.box_uuid, Some(c.box_uuid)).unwrap_err();
    assert!(matches!(
        err,
        CoreError::Cycle { box_uuid, parent_uuid }
            if box_uuid == a.box_uuid && parent_uuid == c.box_uuid
    ));
    assert_eq!(parent_of(&service, &a), None);
    assert_eq!(parent_of(&service, &b), Some(a.box_uuid));
    assert_eq!(parent_of(&service, &c), Some(b.box_uuid));

    assert!(service
        .would_create_cycle(a.box_uuid, Some(b.box_uuid))
        .unwrap());
    assert!(!service
        .would_create_cycle(c.box_uuid, Some(a.box_uuid))
        .unwrap());
}

#[test]
fn reparent_to_self_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let a = create(&service, "100", None);

    let err = service.reparent_box(a.box_uuid, Some(a.box_uuid)).unwrap_err();
    assert_eq!(err.code(), "cycle");
    assert_eq!(parent_of(&service, &a), None);
}

#[test]
fn reparent_to_ancestor_or_top_level_is_allowed() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let a = create(&service, "100", None);
    let b = create(&service, "101", Some(&a));
    let c = create(&service, "102", Some(&b));

    let moved = service.reparent_box(c.box_uuid, Some(a.box_uuid)).unwrap();
    assert_eq!(moved.parent_uuid, Some(a.box_uuid));

    let lifted = service.reparent_box(b.box_uuid, None).unwrap();
    assert!(lifted.is_top_level());

    let top_level = service
        .list_boxes(&BoxListQuery {
            parent: ParentFilter::TopLevel,
            short_id_range: None,
        })
        .unwrap();
    let codes = top_level
        .iter()
        .map(|record| record.short_id.as_text())
        .collect::<Vec<_>>();
    assert_eq!(codes, vec!["100", "101"]);
}

#[test]
fn reparent_with_unknown_boxes_returns_not_found() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let a = create(&service, "100", None);
    let ghost = Uuid::new_v4();

    let err = service.reparent_box(a.box_uuid, Some(ghost)).unwrap_err();
    assert!(matches!(err, CoreError::NotFound(EntityRef::Box(id)) if id == ghost));
    let err = service.reparent_box(ghost, None).unwrap_err();
    assert!(matches!(err, CoreError::NotFound(EntityRef::Box(id)) if id == ghost));
}

#[test]
fn short_ids_are_unique_across_create_and_rename() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let _first = create(&service, "100", None);
    let second = create(&service, "101", None);

    let err = service
        .create_box(NewBox {
            short_id: Some(ShortId::parse("100").unwrap()),
            ..NewBox::default()
        })
        .unwrap_err();
    assert!(matches!(err, CoreError::DuplicateShortId(id) if id.as_text() == "100"));

    let err = service
        .update_box(
            second.box_uuid,
            BoxPatch {
                short_id: Some(ShortId::parse("100").unwrap()),
                ..BoxPatch::default()
            },
        )
        .unwrap_err();
    assert_eq!(err.code(), "duplicate_short_id");

    let renamed = service
        .update_box(
            second.box_uuid,
            BoxPatch {
                short_id: Some(ShortId::parse("250").unwrap()),
                label: Some(Some("  Spares  ".to_string())),
                tags: Some(vec!["Winter".to_string(), "winter ".to_string()]),
                ..BoxPatch::default()
            },
        )
        .unwrap();
    assert_eq!(renamed.short_id.as_text(), "250");
    assert_eq!(renamed.label.as_deref(), Some("Spares"));
    assert_eq!(renamed.tags, vec!["winter".to_string()]);
    assert!(service.find_box_by_short_id("250").unwrap().is_some());
    assert!(service.find_box_by_short_id("101").unwrap().is_none());
}

#[test]
fn auto_issued_short_ids_skip_taken_and_reserved_codes() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    create(&service, "000", None);

    let issued = service.create_box(NewBox::default()).unwrap();
    assert_eq!(issued.short_id.as_text(), "001");

    let band = ShortIdRange::new(
        ShortId::parse("498").unwrap(),
        ShortId::parse("601").unwrap(),
    )
    .unwrap();
    create(&service, "498", None);
    create(&service, "499", None);
    assert_eq!(service.next_free_short_id(band).unwrap().as_text(), "600");

    let reserved = ShortIdRange::reserved();
    assert_eq!(service.next_free_short_id(reserved).unwrap().as_text(), "500");
}

#[test]
fn invalid_short_id_text_is_invalid_input() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let err = service.find_box_by_short_id("12").unwrap_err();
    assert_eq!(err.code(), "invalid_input");
}

#[test]
fn concurrent_crossing_reparents_leave_exactly_one_applied() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("race.db");
    let (a, b) = {
        let conn = open_db(&path).unwrap();
        let service = service(&conn);
        let a = create(&service, "100", None);
        let b = create(&service, "101", None);
        (a.box_uuid, b.box_uuid)
    };

    let barrier = Arc::new(Barrier::new(2));
    let handles = [(a, b), (b, a)]
        .into_iter()
        .map(|(moving, parent)| {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || -> CoreResult<()> {
                let conn = open_db(&path).unwrap();
                let service = BoxService::new(SqliteBoxRepository::try_new(&conn).unwrap());
                barrier.wait();
                service.reparent_box(moving, Some(parent)).map(|_| ())
            })
        })
        .collect::<Vec<_>>();
    let results = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect::<Vec<_>>();

    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|result| matches!(result, Err(CoreError::Cycle { .. }))));

    let conn = open_db(&path).unwrap();
    let service = service(&conn);
    let a_parent = service.require_box(a).unwrap().parent_uuid;
    let b_parent = service.require_box(b).unwrap().parent_uuid;
    assert!(
        (a_parent == Some(b) && b_parent.is_none()) || (b_parent == Some(a) && a_parent.is_none())
    );
}
