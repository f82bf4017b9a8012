use portal_gate::storage::{
    CookieJar, FileStore, KeyValueStore, MemoryStore, SetCookie, StorageError,
};
use std::{path::PathBuf, time::Duration};

fn scratch_path(name: &str) -> PathBuf {
    std::env::temp_dir()
        .join(format!("portal-gate-{}-{}", name, uuid::Uuid::new_v4()))
        .join("preferences.json")
}

#[cfg(test)]
mod memory_tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_roundtrip() {
        let store = MemoryStore::new();

        assert_eq!(store.get("missing").await.unwrap(), None);
        store.set("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_memory_failure() {
        let store = MemoryStore::new_failing();

        assert!(matches!(
            store.get("k").await,
            Err(StorageError::Unavailable(_))
        ));
        assert!(store.set("k", "v").await.is_err());
    }
}

#[cfg(test)]
mod file_tests {
    use super::*;

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let path = scratch_path("persist");

        let store = FileStore::new(&path);
        assert_eq!(store.get("preferred_locale").await.unwrap(), None);
        store.set("preferred_locale", "fr").await.unwrap();
        store.set("other", "x").await.unwrap();

        let reopened = FileStore::new(&path);
        assert_eq!(
            reopened.get("preferred_locale").await.unwrap().as_deref(),
            Some("fr")
        );
        assert_eq!(reopened.get("other").await.unwrap().as_deref(), Some("x"));

        let _ = tokio::fs::remove_dir_all(path.parent().unwrap()).await;
    }

    #[tokio::test]
    async fn test_file_store_reports_corruption() {
        let path = scratch_path("corrupt");
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let store = FileStore::new(&path);

        assert!(matches!(
            store.get("preferred_locale").await,
            Err(StorageError::Corrupt(_))
        ));

        let _ = tokio::fs::remove_dir_all(path.parent().unwrap()).await;
    }
}

#[cfg(test)]
mod cookie_tests {
    use super::*;

    #[test]
    fn test_set_cookie_rendering() {
        let cookie = SetCookie {
            name: "NEXT_LOCALE".to_string(),
            value: "fr".to_string(),
            path: "/".to_string(),
            max_age: Duration::from_secs(31_536_000),
        };

        assert_eq!(
            cookie.to_string(),
            "NEXT_LOCALE=fr; Path=/; Max-Age=31536000"
        );
    }

    #[test]
    fn test_cookie_jar_set_and_overwrite() {
        let jar = CookieJar::new("http://127.0.0.1:3000").unwrap();
        let cookie = |value: &str| SetCookie {
            name: "NEXT_LOCALE".to_string(),
            value: value.to_string(),
            path: "/".to_string(),
            max_age: Duration::from_secs(60),
        };

        assert_eq!(jar.get("NEXT_LOCALE"), None);
        jar.set(&cookie("fr"));
        jar.set(&cookie("ar"));

        assert_eq!(jar.get("NEXT_LOCALE").as_deref(), Some("ar"));
    }

    #[test]
    fn test_cookie_jar_rejects_bad_origin() {
        assert!(matches!(
            CookieJar::new("not a url"),
            Err(StorageError::InvalidOrigin(_))
        ));
    }
}
