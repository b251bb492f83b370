mod support;

use support::CountingStorage;
use transit_core::cache_config::{CACHE_TYPE_KEY, LEGACY_CACHE_SIZE_KEY};
use transit_core::{
    CacheConfig, CacheConfigRequest, CacheConfigView, CacheType, Error, MountBuilder, TransitMount,
};

async fn mount(storage: &CountingStorage) -> TransitMount {
    MountBuilder::default().build(storage.clone()).await.unwrap()
}

#[tokio::test]
async fn write_then_read_round_trips() {
    let storage = CountingStorage::new();
    let mount = mount(&storage).await;

    mount
        .cache_config()
        .write(&CacheConfigRequest::lru(50))
        .await
        .unwrap();

    assert_eq!(
        mount.cache_config().read(),
        CacheConfigView {
            cache_type: "lru".into(),
            cache_max_size: 50,
        }
    );
    assert_eq!(mount.manager().cache_type(), CacheType::Lru);
}

#[tokio::test]
async fn identical_write_is_a_no_op() {
    let storage = CountingStorage::new();
    let mount = mount(&storage).await;

    mount
        .cache_config()
        .write(&CacheConfigRequest::unlimited())
        .await
        .unwrap();
    assert_eq!(mount.manager().conversion_count(), 0);
    assert_eq!(storage.put_calls(), 0);

    mount
        .cache_config()
        .write(&CacheConfigRequest::lru(10))
        .await
        .unwrap();
    let conversions = mount.manager().conversion_count();
    let puts = storage.put_calls();
    assert_eq!(conversions, 1);
    assert_eq!(puts, 1);

    mount
        .cache_config()
        .write(&CacheConfigRequest::lru(10))
        .await
        .unwrap();
    assert_eq!(mount.manager().conversion_count(), conversions);
    assert_eq!(storage.put_calls(), puts);
}

#[tokio::test]
async fn invalid_writes_leave_configuration_unchanged() {
    let storage = CountingStorage::new();
    let mount = mount(&storage).await;
    mount
        .cache_config()
        .write(&CacheConfigRequest::lru(8))
        .await
        .unwrap();

    let bogus = CacheConfigRequest {
        cache_type: "bogus".into(),
        cache_size: None,
    };
    let err = mount.cache_config().write(&bogus).await.unwrap_err();
    assert!(err.is_invalid_request());
    assert_eq!(err.to_string(), "unknown cache-type \"bogus\"");

    let missing_size = CacheConfigRequest {
        cache_type: "lru".into(),
        cache_size: None,
    };
    let err = mount.cache_config().write(&missing_size).await.unwrap_err();
    assert!(matches!(err, Error::InvalidRequest(_)));

    assert_eq!(mount.cache_config().live(), CacheConfig::lru(8).unwrap());
    assert_eq!(mount.manager().conversion_count(), 1);
    assert_eq!(storage.put_calls(), 1);
}

#[tokio::test]
async fn written_configuration_survives_restart() {
    let storage = CountingStorage::new();
    {
        let mount = mount(&storage).await;
        mount
            .cache_config()
            .write(&CacheConfigRequest::lru(25))
            .await
            .unwrap();
    }

    let restarted = mount(&storage).await;
    assert_eq!(restarted.config().restored, CacheConfig::lru(25).unwrap());
    assert_eq!(restarted.cache_config().read().cache_max_size, 25);

    restarted
        .cache_config()
        .write(&CacheConfigRequest::unlimited())
        .await
        .unwrap();
    let again = mount(&storage).await;
    assert_eq!(again.cache_config().read().cache_type, "unlimited");
    assert_eq!(again.cache_config().read().cache_max_size, 0);
}

#[tokio::test]
async fn primary_record_wins_over_legacy_size() {
    let storage = CountingStorage::new();
    storage
        .put_raw(CACHE_TYPE_KEY, br#"{"cacheType":0,"size":0}"#)
        .await;
    storage.put_raw(LEGACY_CACHE_SIZE_KEY, br#"{"Size":40}"#).await;

    let mount = mount(&storage).await;
    assert_eq!(mount.cache_config().live(), CacheConfig::unbounded());
    assert_eq!(storage.get_calls(LEGACY_CACHE_SIZE_KEY), 0);
}

#[tokio::test]
async fn legacy_zero_size_means_unbounded() {
    let storage = CountingStorage::new();
    storage.put_raw(LEGACY_CACHE_SIZE_KEY, br#"{"Size":0}"#).await;
    let mount = mount(&storage).await;
    assert_eq!(mount.cache_config().live(), CacheConfig::unbounded());
}

#[tokio::test]
async fn corrupt_config_record_fails_startup() {
    let storage = CountingStorage::new();
    storage.put_raw(CACHE_TYPE_KEY, b"not json").await;
    let err = MountBuilder::default()
        .build(storage.clone())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::Decode { .. }));
}

#[tokio::test]
async fn conversion_drops_cached_policies() {
    let storage = CountingStorage::new();
    storage.seed(&support::policy("orders")).await;
    let mount = mount(&storage).await;
    mount.manager().get_policy("orders").await.unwrap();

    mount
        .cache_config()
        .write(&CacheConfigRequest::lru(4))
        .await
        .unwrap();
    assert_eq!(mount.manager().cached_len(), 0);
    mount.manager().get_policy("orders").await.unwrap();
    assert_eq!(storage.policy_reads("orders"), 2);
}

#[tokio::test]
async fn failed_persist_restores_previous_configuration() {
    let storage = CountingStorage::new();
    let mount = mount(&storage).await;

    storage.set_fail_puts(true);
    let err = mount
        .cache_config()
        .write(&CacheConfigRequest::lru(50))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Storage { .. }));
    assert_eq!(mount.cache_config().live(), CacheConfig::unbounded());
    assert!(storage.raw(CACHE_TYPE_KEY).await.is_none());

    storage.set_fail_puts(false);
    mount
        .cache_config()
        .write(&CacheConfigRequest::lru(50))
        .await
        .unwrap();
    assert!(storage.raw(CACHE_TYPE_KEY).await.is_some());

    let restarted = crate::mount(&storage).await;
    assert_eq!(
        restarted.cache_config().read(),
        CacheConfigView {
            cache_type: "lru".into(),
            cache_max_size: 50,
        }
    );
}

#[tokio::test]
async fn persisted_zero_lru_size_fails_as_conversion() {
    let storage = CountingStorage::new();
    storage
        .put_raw(CACHE_TYPE_KEY, br#"{"cacheType":1,"size":0}"#)
        .await;

    let err = MountBuilder::default()
        .build(storage.clone())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::Conversion { cache_type: "lru", .. }));
    assert!(err.is_invalid_request());
    assert!(
        err.to_string()
            .starts_with("failed to convert cache-type to lru: ")
    );
}
