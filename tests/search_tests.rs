mod common;

use common::{metadata, reported, seed_enriched, test_db};
use ludex::catalog::index;
use ludex::catalog::reconcile::{reconcile_user_library, SyncMode};
use ludex::catalog::search::{search, SearchFilters, SortDir, SortKey};
use ludex::catalog::views;
use ludex::normalization::platform::PlatformTag;

fn no_filters() -> SearchFilters {
    SearchFilters::default()
}

#[tokio::test]
async fn only_enriched_games_are_visible() {
    let db = test_db().await;

    // Unset: created through reconciliation, never enriched.
    reconcile_user_library(
        &db,
        "user-a",
        &[reported("Invisible Unset", "steam")],
        SyncMode::Incremental,
    )
    .await
    .unwrap();

    // Failed: attempted and marked.
    reconcile_user_library(
        &db,
        "user-a",
        &[reported("Invisible Failed", "steam")],
        SyncMode::Incremental,
    )
    .await
    .unwrap();
    let failed = index::find_by_normalized_name(&db, "invisible failed")
        .await
        .unwrap()
        .unwrap();
    index::mark_enrichment_failed(&db, failed.id).await.unwrap();

    seed_enriched(&db, "Visible", 10, metadata(&["Action"], &["Linux"], &[], None)).await;

    let page = search(&db, &no_filters(), SortKey::Name, SortDir::Asc, 1, 20)
        .await
        .unwrap();
    assert_eq!(page.games.len(), 1);
    assert_eq!(page.games[0].name, "Visible");
    assert_eq!(page.pagination.total, 1);
}

#[tokio::test]
async fn owner_count_sort_with_name_tiebreak() {
    let db = test_db().await;
    let zero = seed_enriched(&db, "Zero Owners", 1, metadata(&[], &[], &[], None)).await;
    let one = seed_enriched(&db, "One Owner", 2, metadata(&[], &[], &[], None)).await;
    let two = seed_enriched(&db, "Two Owners", 3, metadata(&[], &[], &[], None)).await;
    // Tie with "Two Owners" on count; name breaks it.
    let also_two = seed_enriched(&db, "Also Two Owners", 4, metadata(&[], &[], &[], None)).await;

    index::upsert_owner(&db, one, "u1", PlatformTag::Steam).await.unwrap();
    for game in [two, also_two] {
        index::upsert_owner(&db, game, "u1", PlatformTag::Steam).await.unwrap();
        index::upsert_owner(&db, game, "u2", PlatformTag::Gog).await.unwrap();
    }
    // Same user on a second platform must not inflate the distinct count.
    index::upsert_owner(&db, two, "u1", PlatformTag::Epic).await.unwrap();
    let _ = zero;

    let asc = search(&db, &no_filters(), SortKey::OwnerCount, SortDir::Asc, 1, 20)
        .await
        .unwrap();
    let names: Vec<&str> = asc.games.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["Zero Owners", "One Owner", "Also Two Owners", "Two Owners"]
    );
    assert_eq!(
        asc.games.iter().map(|g| g.owner_count).collect::<Vec<_>>(),
        vec![0, 1, 2, 2]
    );

    let desc = search(&db, &no_filters(), SortKey::OwnerCount, SortDir::Desc, 1, 20)
        .await
        .unwrap();
    let names: Vec<&str> = desc.games.iter().map(|g| g.name.as_str()).collect();
    // Ties still break by ascending name for deterministic pagination.
    assert_eq!(
        names,
        vec!["Also Two Owners", "Two Owners", "One Owner", "Zero Owners"]
    );
}

#[tokio::test]
async fn pc_filter_expands_to_family_union() {
    let db = test_db().await;
    seed_enriched(
        &db,
        "Windows Game",
        1,
        metadata(&[], &["PC (Microsoft Windows)"], &[], None),
    )
    .await;
    seed_enriched(&db, "Linux Game", 2, metadata(&[], &["Linux"], &[], None)).await;
    seed_enriched(&db, "Mac Game", 3, metadata(&[], &["Mac"], &[], None)).await;
    seed_enriched(
        &db,
        "Console Game",
        4,
        metadata(&[], &["PlayStation 5"], &[], None),
    )
    .await;

    let filters = SearchFilters {
        platforms: vec!["PC".to_string()],
        ..Default::default()
    };
    let page = search(&db, &filters, SortKey::Name, SortDir::Asc, 1, 20)
        .await
        .unwrap();
    let names: Vec<&str> = page.games.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, vec!["Linux Game", "Mac Game", "Windows Game"]);
}

#[tokio::test]
async fn set_filters_are_or_within_and_between() {
    let db = test_db().await;
    seed_enriched(
        &db,
        "Action RPG",
        1,
        metadata(&["Action", "Role-playing (RPG)"], &["Linux"], &["Single player"], Some(90.0)),
    )
    .await;
    seed_enriched(
        &db,
        "Pure Strategy",
        2,
        metadata(&["Strategy"], &["Linux"], &["Multiplayer"], Some(70.0)),
    )
    .await;

    // OR within the genre set.
    let filters = SearchFilters {
        genres: vec!["Action".to_string(), "Strategy".to_string()],
        ..Default::default()
    };
    let page = search(&db, &filters, SortKey::Name, SortDir::Asc, 1, 20)
        .await
        .unwrap();
    assert_eq!(page.games.len(), 2);

    // AND across filter groups.
    let filters = SearchFilters {
        genres: vec!["Action".to_string(), "Strategy".to_string()],
        game_modes: vec!["Single player".to_string()],
        min_rating: Some(80.0),
        ..Default::default()
    };
    let page = search(&db, &filters, SortKey::Name, SortDir::Asc, 1, 20)
        .await
        .unwrap();
    assert_eq!(page.games.len(), 1);
    assert_eq!(page.games[0].name, "Action RPG");
}

#[tokio::test]
async fn name_filter_is_case_insensitive_substring() {
    let db = test_db().await;
    seed_enriched(&db, "Super Mario Bros", 1, metadata(&[], &[], &[], None)).await;
    seed_enriched(&db, "Halo", 2, metadata(&[], &[], &[], None)).await;

    let filters = SearchFilters {
        name: Some("mArIo".to_string()),
        ..Default::default()
    };
    let page = search(&db, &filters, SortKey::Name, SortDir::Asc, 1, 20)
        .await
        .unwrap();
    assert_eq!(page.games.len(), 1);
    assert_eq!(page.games[0].name, "Super Mario Bros");
}

#[tokio::test]
async fn name_filter_treats_like_wildcards_as_literals() {
    let db = test_db().await;
    seed_enriched(&db, "snake_case quest", 1, metadata(&[], &[], &[], None)).await;
    seed_enriched(&db, "snakeXcase quest", 2, metadata(&[], &[], &[], None)).await;
    seed_enriched(&db, "100% Orange Juice", 3, metadata(&[], &[], &[], None)).await;

    // An underscore in the query matches only a literal underscore.
    let filters = SearchFilters {
        name: Some("ke_ca".to_string()),
        ..Default::default()
    };
    let page = search(&db, &filters, SortKey::Name, SortDir::Asc, 1, 20)
        .await
        .unwrap();
    assert_eq!(page.games.len(), 1);
    assert_eq!(page.games[0].name, "snake_case quest");

    // A percent sign is searchable, not a wildcard.
    let filters = SearchFilters {
        name: Some("100%".to_string()),
        ..Default::default()
    };
    let page = search(&db, &filters, SortKey::Name, SortDir::Asc, 1, 20)
        .await
        .unwrap();
    assert_eq!(page.games.len(), 1);
    assert_eq!(page.games[0].name, "100% Orange Juice");
}

#[tokio::test]
async fn rating_sort_sinks_nulls() {
    let db = test_db().await;
    seed_enriched(&db, "Rated High", 1, metadata(&[], &[], &[], Some(95.0))).await;
    seed_enriched(&db, "Rated Low", 2, metadata(&[], &[], &[], Some(40.0))).await;
    seed_enriched(&db, "Unrated", 3, metadata(&[], &[], &[], None)).await;

    let page = search(&db, &no_filters(), SortKey::Rating, SortDir::Desc, 1, 20)
        .await
        .unwrap();
    let names: Vec<&str> = page.games.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, vec!["Rated High", "Rated Low", "Unrated"]);
}

#[tokio::test]
async fn pagination_clamps_out_of_range_pages() {
    let db = test_db().await;
    for i in 0..5 {
        seed_enriched(
            &db,
            &format!("Game {i}"),
            i + 1,
            metadata(&[], &[], &[], None),
        )
        .await;
    }

    let page = search(&db, &no_filters(), SortKey::Name, SortDir::Asc, 99, 2)
        .await
        .unwrap();
    // 5 games at limit 2 -> 3 pages; page 99 clamps to the last one.
    assert_eq!(page.pagination.total, 5);
    assert_eq!(page.pagination.total_pages, 3);
    assert_eq!(page.pagination.page, 3);
    assert_eq!(page.games.len(), 1);
    assert!(!page.pagination.has_next);
    assert!(page.pagination.has_prev);

    // Limit 0 clamps up to 1.
    let page = search(&db, &no_filters(), SortKey::Name, SortDir::Asc, 1, 0)
        .await
        .unwrap();
    assert_eq!(page.pagination.limit, 1);
    assert_eq!(page.games.len(), 1);
    assert!(page.pagination.has_next);
    assert!(!page.pagination.has_prev);
}

#[tokio::test]
async fn empty_catalog_pages_cleanly() {
    let db = test_db().await;
    let page = search(&db, &no_filters(), SortKey::Name, SortDir::Asc, 4, 10)
        .await
        .unwrap();
    assert_eq!(page.pagination.total, 0);
    assert_eq!(page.pagination.total_pages, 0);
    assert!(page.games.is_empty());
    assert!(!page.pagination.has_next);
    assert!(!page.pagination.has_prev);
}

#[tokio::test]
async fn filter_options_group_pc_family() {
    let db = test_db().await;
    seed_enriched(
        &db,
        "Windows Game",
        1,
        metadata(&["Action"], &["PC (Microsoft Windows)", "PlayStation 5"], &["Single player"], None),
    )
    .await;
    seed_enriched(
        &db,
        "Linux Game",
        2,
        metadata(&["Indie"], &["Linux"], &["Co-operative"], None),
    )
    .await;
    // Unenriched games contribute nothing to facet options.
    reconcile_user_library(
        &db,
        "user-a",
        &[reported("Pending Game", "steam")],
        SyncMode::Incremental,
    )
    .await
    .unwrap();

    let options = index::filter_options(&db).await.unwrap();
    assert_eq!(options.genres, vec!["Action", "Indie"]);
    assert_eq!(options.platforms, vec!["PC", "PlayStation 5"]);
    assert_eq!(options.game_modes, vec!["Co-operative", "Single player"]);
}

#[tokio::test]
async fn detail_view_resolves_names_and_merges_platforms() {
    let db = test_db().await;
    let id = seed_enriched(&db, "Shared Game", 50, metadata(&["Action"], &[], &[], None)).await;
    index::upsert_owner(&db, id, "u1", PlatformTag::Steam).await.unwrap();
    index::upsert_owner(&db, id, "u1", PlatformTag::Gog).await.unwrap();
    index::upsert_owner(&db, id, "u2", PlatformTag::Epic).await.unwrap();
    index::upsert_user_profile(&db, "u1", "Alice").await.unwrap();

    let view = views::get_game_details(&db, id)
        .await
        .unwrap()
        .expect("detail exists");
    assert_eq!(view.owner_count, 2);

    let alice = view.owners.iter().find(|o| o.user_id == "u1").unwrap();
    assert_eq!(alice.display_name, "Alice");
    assert_eq!(alice.platforms, vec!["gog", "steam"]);

    // Unknown profile falls back to the opaque id.
    let other = view.owners.iter().find(|o| o.user_id == "u2").unwrap();
    assert_eq!(other.display_name, "u2");

    // Unknown id is a clean miss, not an error.
    assert!(views::get_game_details(&db, 9999).await.unwrap().is_none());
}
