use boxtrack_core::db::open_db_in_memory;
use boxtrack_core::{
    BoxListQuery, BoxService, CoreError, CustodyService, FullWipeConfirmation, NewBox, NewItem,
    SeedConfig, SeedMetadata, SeedNode, SeedService, ShortId, ShortIdRange, SqliteBoxRepository,
    SqliteCustodyRepository, SqliteFixtureRepository,
};
use rusqlite::Connection;

type SqliteSeedService<'conn> = SeedService<
    SqliteBoxRepository<'conn>,
    SqliteCustodyRepository<'conn>,
    SqliteFixtureRepository<'conn>,
>;

fn seeder(conn: &Connection, config: SeedConfig) -> SqliteSeedService<'_> {
    SeedService::with_config(
        SqliteBoxRepository::try_new(conn).unwrap(),
        SqliteCustodyRepository::try_new(conn).unwrap(),
        SqliteFixtureRepository::try_new(conn).unwrap(),
        config,
    )
}

fn boxes(conn: &Connection) -> BoxService<SqliteBoxRepository<'_>> {
    BoxService::new(SqliteBoxRepository::try_new(conn).unwrap())
}

fn forest() -> Vec<SeedNode> {
    vec![
        SeedNode {
            label: "Garage".to_string(),
            metadata: SeedMetadata {
                location: Some("north wall".to_string()),
                tags: vec!["Tools".to_string()],
                ..SeedMetadata::default()
            },
            item_names: vec!["Drill".to_string(), "Saw".to_string()],
            children: vec![SeedNode::new("Shelf").with_items(["Nails"])],
        },
        SeedNode::new("Attic"),
    ]
}

fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
        row.get(0)
    })
    .unwrap()
}

fn codes_in(conn: &Connection, range: ShortIdRange) -> Vec<String> {
    boxes(conn)
        .list_boxes(&BoxListQuery {
            short_id_range: Some(range),
            ..BoxListQuery::default()
        })
        .unwrap()
        .iter()
        .map(|record| record.short_id.as_text())
        .collect()
}

fn keep_box(conn: &Connection, short_id: &str) {
    let kept = boxes(conn)
        .create_box(NewBox {
            short_id: Some(ShortId::parse(short_id).unwrap()),
            label: Some("Keep".to_string()),
            ..NewBox::default()
        })
        .unwrap();
    CustodyService::new(SqliteCustodyRepository::try_new(conn).unwrap())
        .create_item_in_box(kept.box_uuid, &NewItem::named("Heirloom"))
        .unwrap();
}

#[test]
fn seeding_assigns_reserved_ids_depth_first() {
    let conn = open_db_in_memory().unwrap();
    let report = seeder(&conn, SeedConfig::default())
        .seed_from_trees(&forest())
        .unwrap();

    assert_eq!(report.boxes_created, 3);
    assert_eq!(report.items_created, 3);
    assert_eq!(report.root_box_ids.len(), 2);
    assert_eq!(
        codes_in(&conn, ShortIdRange::reserved()),
        vec!["500", "501", "502"]
    );

    let service = boxes(&conn);
    let garage = service.find_box_by_short_id("500").unwrap().unwrap();
    let shelf = service.find_box_by_short_id("501").unwrap().unwrap();
    let attic = service.find_box_by_short_id("502").unwrap().unwrap();
    assert_eq!(garage.label.as_deref(), Some("Garage"));
    assert_eq!(garage.location.as_deref(), Some("north wall"));
    assert_eq!(garage.tags, vec!["tools".to_string()]);
    assert_eq!(garage.item_ids.len(), 2);
    assert_eq!(shelf.parent_uuid, Some(garage.box_uuid));
    assert!(attic.is_top_level());
}

#[test]
fn reseeding_is_repeatable_and_spares_outside_data() {
    let conn = open_db_in_memory().unwrap();
    keep_box(&conn, "100");
    let seeder = seeder(&conn, SeedConfig::default());

    seeder.seed_from_trees(&forest()).unwrap();
    let boxes_after_first = count(&conn, "boxes");
    let items_after_first = count(&conn, "items");

    let report = seeder.seed_from_trees(&forest()).unwrap();
    assert_eq!(report.wiped.boxes_deleted, 3);
    assert_eq!(report.wiped.items_deleted, 3);
    assert_eq!(count(&conn, "boxes"), boxes_after_first);
    assert_eq!(count(&conn, "items"), items_after_first);
    assert_eq!(boxes_after_first, 4);
    assert_eq!(items_after_first, 4);

    let kept = boxes(&conn).find_box_by_short_id("100").unwrap().unwrap();
    assert_eq!(kept.item_ids.len(), 1);
}

#[test]
fn wipe_releases_outside_children_of_reserved_boxes() {
    let conn = open_db_in_memory().unwrap();
    let seeder = seeder(&conn, SeedConfig::default());
    seeder.seed_from_trees(&forest()).unwrap();

    let service = boxes(&conn);
    let garage = service.find_box_by_short_id("500").unwrap().unwrap();
    let outside = service
        .create_box(NewBox {
            short_id: Some(ShortId::parse("200").unwrap()),
            parent_uuid: Some(garage.box_uuid),
            ..NewBox::default()
        })
        .unwrap();

    let report = seeder.wipe_reserved_range().unwrap();
    assert_eq!(report.boxes_deleted, 3);
    assert_eq!(report.boxes_released, 1);
    assert!(codes_in(&conn, ShortIdRange::reserved()).is_empty());
    assert!(service
        .require_box(outside.box_uuid)
        .unwrap()
        .is_top_level());
}

#[test]
fn exhausted_reserved_range_fails_before_any_write() {
    let conn = open_db_in_memory().unwrap();
    let narrow = SeedConfig {
        reserved: ShortIdRange::new(
            ShortId::parse("500").unwrap(),
            ShortId::parse("501").unwrap(),
        )
        .unwrap(),
        ..SeedConfig::default()
    };
    keep_box(&conn, "500");

    let err = seeder(&conn, narrow).seed_from_trees(&forest()).unwrap_err();
    match err {
        CoreError::OutOfIds {
            requested,
            available,
            ..
        } => {
            assert_eq!(requested, 3);
            assert_eq!(available, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(codes_in(&conn, ShortIdRange::reserved()), vec!["500"]);
    assert_eq!(count(&conn, "items"), 1);
}

#[test]
fn blank_item_names_fail_before_any_write() {
    let conn = open_db_in_memory().unwrap();
    keep_box(&conn, "500");
    let trees = vec![SeedNode::new("Bin").with_items(["Ok", " "])];

    let err = seeder(&conn, SeedConfig::default())
        .seed_from_trees(&trees)
        .unwrap_err();
    assert_eq!(err.code(), "invalid_input");
    assert_eq!(count(&conn, "boxes"), 1);
}

#[test]
fn full_mode_wipes_everything_and_skips_reserved_band() {
    let conn = open_db_in_memory().unwrap();
    keep_box(&conn, "100");
    keep_box(&conn, "550");
    let config = SeedConfig {
        full_start: ShortId::parse("498").unwrap(),
        ..SeedConfig::default()
    };

    let report = seeder(&conn, config)
        .seed_full(
            &[
                SeedNode::new("Hall").with_children([SeedNode::new("Closet")]),
                SeedNode::new("Porch").with_items(["Broom"]),
                SeedNode::new("Shed"),
            ],
            FullWipeConfirmation::wipe_everything(),
        )
        .unwrap();

    assert_eq!(report.wiped.boxes_deleted, 2);
    assert_eq!(report.wiped.items_deleted, 2);
    assert_eq!(report.boxes_created, 4);
    assert_eq!(
        codes_in(&conn, ShortIdRange::full()),
        vec!["498", "499", "600", "601"]
    );
    assert_eq!(count(&conn, "items"), 1);
}

#[test]
fn full_mode_checks_capacity_before_wiping() {
    let conn = open_db_in_memory().unwrap();
    keep_box(&conn, "100");
    let config = SeedConfig {
        full_start: ShortId::parse("999").unwrap(),
        ..SeedConfig::default()
    };

    let err = seeder(&conn, config)
        .seed_full(&forest(), FullWipeConfirmation::wipe_everything())
        .unwrap_err();
    assert_eq!(err.code(), "out_of_ids");
    assert_eq!(count(&conn, "boxes"), 1);
}

#[test]
fn auto_issued_ids_stay_out_of_a_custom_reserved_band() {
    let conn = open_db_in_memory().unwrap();
    let config = SeedConfig {
        reserved: ShortIdRange::new(ShortId::parse("000").unwrap(), ShortId::parse("099").unwrap())
            .unwrap(),
        ..SeedConfig::default()
    };
    let user_boxes =
        BoxService::with_reserved(SqliteBoxRepository::try_new(&conn).unwrap(), config.reserved);
    let user_box = user_boxes.create_box(NewBox::default()).unwrap();
    assert_eq!(user_box.short_id.as_text(), "100");

    let report = seeder(&conn, config)
        .seed_from_trees(&[SeedNode::new("Fixture")])
        .unwrap();
    assert_eq!(report.wiped.boxes_deleted, 0);
    assert_eq!(codes_in(&conn, config.reserved), vec!["000"]);
    assert!(user_boxes.get_box(user_box.box_uuid).unwrap().is_some());
}

#[test]
fn reseeding_over_a_half_planted_band_converges() {
    let conn = open_db_in_memory().unwrap();
    // Leftover of a run that stopped after its first box and item.
    keep_box(&conn, "500");

    let report = seeder(&conn, SeedConfig::default())
        .seed_from_trees(&forest())
        .unwrap();
    assert_eq!(report.wiped.boxes_deleted, 1);
    assert_eq!(report.wiped.items_deleted, 1);
    assert_eq!(count(&conn, "boxes"), 3);
    assert_eq!(count(&conn, "items"), 3);
    assert_eq!(
        codes_in(&conn, ShortIdRange::reserved()),
        vec!["500", "501", "502"]
    );
}
