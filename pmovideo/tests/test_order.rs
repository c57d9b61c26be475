use pmovideo::order::merge_order;
use pmovideo::{
    CatalogCache, DataLayout, Error, ManualClock, MemoryFs, OrderReconciler, ProfileId, Settings,
    VideoDescriptor, VideoSyncService,
};
use std::sync::Arc;
use tempfile::TempDir;

fn catalog(entries: &[(&str, usize, &str)]) -> CatalogCache {
    CatalogCache::new(
        1,
        Vec::new(),
        entries
            .iter()
            .map(|(name, idx, dir)| VideoDescriptor::new(*name, *idx, *dir))
            .collect(),
    )
}

fn create_reconciler() -> (TempDir, OrderReconciler) {
    let temp_dir = tempfile::tempdir().unwrap();
    let reconciler = OrderReconciler::new(DataLayout::new(temp_dir.path()));
    (temp_dir, reconciler)
}

fn keys(order: &[&str]) -> Vec<String> {
    order.iter().map(|k| k.to_string()).collect()
}

#[test]
fn test_reconcile_is_idempotent() {
    let (_temp_dir, reconciler) = create_reconciler();
    let profile = ProfileId::default_profile();
    let cat = catalog(&[("c.mp4", 0, "/v"), ("a.mp4", 0, "/v"), ("b.mp4", 1, "/w")]);

    let first = reconciler.reconcile(&profile, &cat);
    let second = reconciler.reconcile(&profile, &cat);
    assert_eq!(first, second);
    assert_eq!(first, keys(&["/v|a.mp4", "/w|b.mp4", "/v|c.mp4"]));
}

#[test]
fn test_merge_correctness() {
    // O = [z, x, gone, y], C = {x, y, z, n2, n1}
    let cat = catalog(&[
        ("x.mp4", 0, "/d"),
        ("y.mp4", 0, "/d"),
        ("z.mp4", 0, "/d"),
        ("n2.mp4", 0, "/d"),
        ("n1.mp4", 1, "/e"),
        ("n1.mp4", 0, "/d"),
    ]);
    let persisted = keys(&["/d|z.mp4", "/d|x.mp4", "/d|gone.mp4", "/d|y.mp4"]);

    let result = merge_order(&persisted, &cat);

    // O ∩ C garde l'ordre relatif de O, C \ O suit, trié par (nom, index)
    assert_eq!(
        result,
        keys(&["/d|z.mp4", "/d|x.mp4", "/d|y.mp4", "/d|n1.mp4", "/e|n1.mp4", "/d|n2.mp4"])
    );
    assert!(!result.contains(&"/d|gone.mp4".to_string()));
}

#[test]
fn test_reconcile_persists_only_on_change() {
    let (temp_dir, reconciler) = create_reconciler();
    let profile = ProfileId::sanitize("lobby");
    let cat = catalog(&[("a.mp4", 0, "/v")]);
    let order_path = DataLayout::new(temp_dir.path()).order_path(&profile);

    reconciler.reconcile(&profile, &cat);
    let written = std::fs::metadata(&order_path).unwrap().modified().unwrap();

    std::thread::sleep(std::time::Duration::from_millis(20));
    reconciler.reconcile(&profile, &cat);
    let rewritten = std::fs::metadata(&order_path).unwrap().modified().unwrap();
    assert_eq!(written, rewritten);

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&order_path).unwrap()).unwrap();
    assert_eq!(raw["order"][0], "/v|a.mp4");
}

#[test]
fn test_path_anchored_stability() {
    let (_temp_dir, reconciler) = create_reconciler();
    let profile = ProfileId::default_profile();

    let before = catalog(&[
        ("a.mp4", 0, "/first"),
        ("b.mp4", 1, "/second"),
        ("c.mp4", 1, "/second"),
    ]);
    reconciler.reconcile(&profile, &before);
    reconciler.move_down(&profile, &before, "/first|a.mp4").unwrap();
    reconciler.move_down(&profile, &before, "/first|a.mp4").unwrap();
    let ordered = reconciler.reconcile(&profile, &before);
    assert_eq!(ordered, keys(&["/second|b.mp4", "/second|c.mp4", "/first|a.mp4"]));

    // La liste des répertoires est inversée : les index changent, pas les chemins
    let after = catalog(&[
        ("b.mp4", 0, "/second"),
        ("c.mp4", 0, "/second"),
        ("a.mp4", 1, "/first"),
    ]);
    assert_eq!(reconciler.reconcile(&profile, &after), ordered);
}

#[test]
fn test_boundary_moves_are_noops() {
    let (_temp_dir, reconciler) = create_reconciler();
    let profile = ProfileId::default_profile();
    let cat = catalog(&[("a.mp4", 0, "/v"), ("b.mp4", 0, "/v"), ("c.mp4", 0, "/v")]);

    let initial = reconciler.reconcile(&profile, &cat);
    assert_eq!(reconciler.move_up(&profile, &cat, "/v|a.mp4").unwrap(), initial);
    assert_eq!(reconciler.move_down(&profile, &cat, "/v|c.mp4").unwrap(), initial);
    assert_eq!(reconciler.load(&profile), initial);
}

#[test]
fn test_move_missing_key_is_not_found() {
    let (_temp_dir, reconciler) = create_reconciler();
    let profile = ProfileId::default_profile();
    let cat = catalog(&[("a.mp4", 0, "/v"), ("b.mp4", 0, "/v")]);

    reconciler.reconcile(&profile, &cat);
    reconciler.move_down(&profile, &cat, "/v|a.mp4").unwrap();
    let persisted = reconciler.load(&profile);

    let result = reconciler.move_up(&profile, &cat, "/v|zzz.mp4");
    assert!(matches!(result, Err(Error::NotFound(_))));
    assert_eq!(reconciler.load(&profile), persisted);
}

#[test]
fn test_corrupt_order_starts_over() {
    let (temp_dir, reconciler) = create_reconciler();
    let profile = ProfileId::default_profile();
    let order_path = DataLayout::new(temp_dir.path()).order_path(&profile);
    std::fs::create_dir_all(order_path.parent().unwrap()).unwrap();
    std::fs::write(&order_path, b"{ not json").unwrap();

    let cat = catalog(&[("b.mp4", 0, "/v"), ("a.mp4", 0, "/v")]);
    assert_eq!(reconciler.reconcile(&profile, &cat), keys(&["/v|a.mp4", "/v|b.mp4"]));
}

#[test]
fn test_end_to_end_scenario() {
    let temp_dir = tempfile::tempdir().unwrap();
    let fs = Arc::new(MemoryFs::new());
    fs.add_dir("/dir", 500, &["b.mp4", "a.mp4"]);
    let clock = ManualClock::new(1_000);

    let settings = Settings::new(temp_dir.path(), vec!["/dir".to_string()]);
    let service = VideoSyncService::with_backends(settings, fs.clone(), Arc::new(clock.clone()));
    let profile = ProfileId::default_profile();

    let catalog = service.catalog();
    let order = service.orders().reconcile(&profile, &catalog);
    assert_eq!(order, keys(&["/dir|a.mp4", "/dir|b.mp4"]));

    let moved = service.move_video(&profile, "a.mp4", 0, "down").unwrap();
    assert_eq!(moved, keys(&["/dir|b.mp4", "/dir|a.mp4"]));

    // Idempotence, même si l'ordre ne correspond plus au tri par défaut
    let catalog = service.catalog();
    assert_eq!(
        service.orders().reconcile(&profile, &catalog),
        keys(&["/dir|b.mp4", "/dir|a.mp4"])
    );

    clock.set(3_000);
    fs.remove_file("/dir", "a.mp4", 2_000);
    let catalog = service.catalog();
    assert_eq!(catalog.last_scan_timestamp, 3_000);
    assert_eq!(service.orders().reconcile(&profile, &catalog), keys(&["/dir|b.mp4"]));
}
