//! Bucket ensurer: existence check followed by a conditional create.

use crate::{
    config::AppConfig,
    errors::{InitError, InitResult},
};
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    Client,
    config::{Credentials, Region},
    error::DisplayErrorContext,
    types::{BucketLocationConstraint, CreateBucketConfiguration},
};
use std::future::Future;
use tracing::info;

/// Region that must not be sent as an explicit location constraint.
const LEGACY_DEFAULT_REGION: &str = "us-east-1";

/// Outcome of [`ensure_bucket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketStatus {
    AlreadyExisted,
    Created,
}

/// The two bucket operations the bootstrap needs from a storage backend.
pub trait BucketStore {
    /// `Ok(false)` only for the "not found" class; anything else is an error.
    fn bucket_exists(&self, bucket: &str) -> impl Future<Output = InitResult<bool>> + Send;

    fn create_bucket(&self, bucket: &str) -> impl Future<Output = InitResult<()>> + Send;
}

/// Create `bucket` unless it already exists.
pub async fn ensure_bucket<S: BucketStore>(store: &S, bucket: &str) -> InitResult<BucketStatus> {
    if store.bucket_exists(bucket).await? {
        info!(bucket, "bucket already exists");
        return Ok(BucketStatus::AlreadyExisted);
    }

    store.create_bucket(bucket).await?;
    info!(bucket, "bucket created");
    Ok(BucketStatus::Created)
}

/// [`BucketStore`] over an S3-compatible endpoint (path-style, SigV4).
#[derive(Clone, Debug)]
pub struct S3BucketStore {
    client: Client,
    region: String,
}

impl S3BucketStore {
    pub async fn connect(cfg: &AppConfig) -> Self {
        let credentials = Credentials::new(
            cfg.aws_access_key_id.clone(),
            cfg.aws_secret_access_key.clone(),
            None,
            None,
            "ducklake-init",
        );
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.aws_region.clone()))
            .endpoint_url(cfg.endpoint())
            .credentials_provider(credentials)
            .load()
            .await;
        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(s3_config),
            region: cfg.aws_region.clone(),
        }
    }
}

impl BucketStore for S3BucketStore {
    async fn bucket_exists(&self, bucket: &str) -> InitResult<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                let not_found = err.as_service_error().is_some_and(|e| e.is_not_found())
                    || err
                        .raw_response()
                        .is_some_and(|resp| resp.status().as_u16() == 404);
                if not_found {
                    Ok(false)
                } else {
                    Err(InitError::setup(
                        "checking the bucket",
                        format!("{}: {}", bucket, DisplayErrorContext(&err)),
                    ))
                }
            }
        }
    }

    async fn create_bucket(&self, bucket: &str) -> InitResult<()> {
        let mut request = self.client.create_bucket().bucket(bucket);
        if let Some(constraint) = location_constraint(&self.region) {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(constraint)
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => Ok(()),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_bucket_already_owned_by_you()) =>
            {
                info!(bucket, "bucket was created concurrently");
                Ok(())
            }
            Err(err) => Err(InitError::setup(
                "creating the bucket",
                format!("{}: {}", bucket, DisplayErrorContext(&err)),
            )),
        }
    }
}

fn location_constraint(region: &str) -> Option<BucketLocationConstraint> {
    if region.is_empty() || region == LEGACY_DEFAULT_REGION {
        None
    } else {
        Some(BucketLocationConstraint::from(region))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::tests::scenario_config;
    use axum::{
        Router,
        http::{Method, StatusCode, Uri, header},
        response::IntoResponse,
    };
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    /// In-memory store that records every call it receives.
    #[derive(Default)]
    pub(crate) struct RecordingStore {
        pub existing: Mutex<Vec<String>>,
        pub exists_calls: Mutex<u32>,
        pub create_calls: Mutex<Vec<String>>,
        pub fail_exists_with: Option<String>,
    }

    impl RecordingStore {
        pub(crate) fn with_bucket(bucket: &str) -> Self {
            let store = Self::default();
            store.existing.lock().unwrap().push(bucket.to_string());
            store
        }
    }

    impl BucketStore for RecordingStore {
        async fn bucket_exists(&self, bucket: &str) -> InitResult<bool> {
            *self.exists_calls.lock().unwrap() += 1;
            if let Some(message) = &self.fail_exists_with {
                return Err(InitError::setup("checking the bucket", message.clone()));
            }
            Ok(self.existing.lock().unwrap().iter().any(|b| b == bucket))
        }

        async fn create_bucket(&self, bucket: &str) -> InitResult<()> {
            self.create_calls.lock().unwrap().push(bucket.to_string());
            self.existing.lock().unwrap().push(bucket.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn existing_bucket_is_left_alone() {
        let store = RecordingStore::with_bucket("mybucket");
        let status = ensure_bucket(&store, "mybucket").await.unwrap();

        assert_eq!(status, BucketStatus::AlreadyExisted);
        assert_eq!(*store.exists_calls.lock().unwrap(), 1);
        assert!(store.create_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_bucket_is_created_once() {
        let store = RecordingStore::default();
        let status = ensure_bucket(&store, "mybucket").await.unwrap();

        assert_eq!(status, BucketStatus::Created);
        assert_eq!(*store.create_calls.lock().unwrap(), vec!["mybucket".to_string()]);
    }

    #[tokio::test]
    async fn second_run_is_a_no_op() {
        let store = RecordingStore::default();
        ensure_bucket(&store, "mybucket").await.unwrap();
        let status = ensure_bucket(&store, "mybucket").await.unwrap();

        assert_eq!(status, BucketStatus::AlreadyExisted);
        assert_eq!(store.create_calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn other_existence_failures_are_fatal() {
        let store = RecordingStore {
            fail_exists_with: Some("AccessDenied".into()),
            ..Default::default()
        };
        let err = ensure_bucket(&store, "mybucket").await.unwrap_err();

        assert!(matches!(err, InitError::Setup { .. }));
        assert!(store.create_calls.lock().unwrap().is_empty());
    }

    #[test]
    fn location_constraint_is_omitted_for_us_east_1() {
        assert!(location_constraint("us-east-1").is_none());
        assert_eq!(
            location_constraint("eu-west-1"),
            Some(BucketLocationConstraint::EuWest1)
        );
    }

    const ALREADY_OWNED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Error><Code>BucketAlreadyOwnedByYou</Code><Message>Your previous request to create the named bucket succeeded and you already own it.</Message><BucketName>mybucket</BucketName><RequestId>1</RequestId></Error>"#;

    const ACCESS_DENIED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Error><Code>AccessDenied</Code><Message>Access Denied</Message><RequestId>2</RequestId></Error>"#;

    #[derive(Debug, Clone)]
    struct SeenRequest {
        method: Method,
        path: String,
        body: String,
    }

    type Seen = Arc<Mutex<Vec<SeenRequest>>>;

    /// Minimal path-style S3: HEAD answers `head`, everything else answers `put`.
    async fn spawn_fake_s3(head: StatusCode, put: (StatusCode, &'static str)) -> (String, Seen) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let app = Router::new().fallback(move |method: Method, uri: Uri, body: String| {
            let log = log.clone();
            async move {
                let (status, xml) = if method == Method::HEAD {
                    (head, "")
                } else {
                    put
                };
                log.lock().unwrap().push(SeenRequest {
                    method,
                    path: uri.path().to_string(),
                    body,
                });
                (status, [(header::CONTENT_TYPE, "application/xml")], xml).into_response()
            }
        });
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (format!("http://{}", addr), seen)
    }

    async fn store_for(endpoint: &str, region: &str) -> S3BucketStore {
        let mut cfg = scenario_config();
        cfg.aws_endpoint_url = endpoint.to_string();
        cfg.aws_region = region.to_string();
        S3BucketStore::connect(&cfg).await
    }

    fn methods(seen: &Seen) -> Vec<Method> {
        seen.lock().unwrap().iter().map(|r| r.method.clone()).collect()
    }

    #[tokio::test]
    async fn s3_head_404_means_missing_and_triggers_one_create() {
        let (endpoint, seen) = spawn_fake_s3(StatusCode::NOT_FOUND, (StatusCode::OK, "")).await;
        let store = store_for(&endpoint, "us-east-1").await;

        assert!(!store.bucket_exists("mybucket").await.unwrap());
        seen.lock().unwrap().clear();

        let status = ensure_bucket(&store, "mybucket").await.unwrap();
        assert_eq!(status, BucketStatus::Created);
        assert_eq!(methods(&seen), vec![Method::HEAD, Method::PUT]);
        assert!(seen.lock().unwrap().iter().all(|r| r.path == "/mybucket"));
    }

    #[tokio::test]
    async fn s3_head_403_is_fatal_and_never_creates() {
        let (endpoint, seen) = spawn_fake_s3(StatusCode::FORBIDDEN, (StatusCode::OK, "")).await;
        let store = store_for(&endpoint, "us-east-1").await;

        let err = ensure_bucket(&store, "mybucket").await.unwrap_err();
        assert!(matches!(
            err,
            InitError::Setup { step: "checking the bucket", .. }
        ));
        assert!(!methods(&seen).contains(&Method::PUT));
    }

    #[tokio::test]
    async fn s3_head_200_skips_create() {
        let (endpoint, seen) = spawn_fake_s3(StatusCode::OK, (StatusCode::OK, "")).await;
        let store = store_for(&endpoint, "us-east-1").await;

        let status = ensure_bucket(&store, "mybucket").await.unwrap();
        assert_eq!(status, BucketStatus::AlreadyExisted);
        assert_eq!(methods(&seen), vec![Method::HEAD]);
    }

    #[tokio::test]
    async fn s3_already_owned_by_you_counts_as_created() {
        let (endpoint, seen) =
            spawn_fake_s3(StatusCode::NOT_FOUND, (StatusCode::CONFLICT, ALREADY_OWNED)).await;
        let store = store_for(&endpoint, "us-east-1").await;

        let status = ensure_bucket(&store, "mybucket").await.unwrap();
        assert_eq!(status, BucketStatus::Created);
        assert_eq!(methods(&seen), vec![Method::HEAD, Method::PUT]);
    }

    #[tokio::test]
    async fn s3_create_failure_is_fatal() {
        let (endpoint, _seen) =
            spawn_fake_s3(StatusCode::NOT_FOUND, (StatusCode::FORBIDDEN, ACCESS_DENIED)).await;
        let store = store_for(&endpoint, "us-east-1").await;

        let err = ensure_bucket(&store, "mybucket").await.unwrap_err();
        assert!(matches!(
            err,
            InitError::Setup { step: "creating the bucket", .. }
        ));
    }

    #[tokio::test]
    async fn s3_create_outside_us_east_1_sends_location_constraint() {
        let (endpoint, seen) = spawn_fake_s3(StatusCode::NOT_FOUND, (StatusCode::OK, "")).await;
        let store = store_for(&endpoint, "eu-west-1").await;

        store.create_bucket("mybucket").await.unwrap();
        let requests = seen.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(
            requests[0]
                .body
                .contains("<LocationConstraint>eu-west-1</LocationConstraint>"),
            "body was {:?}",
            requests[0].body
        );
    }

    #[tokio::test]
    async fn s3_create_in_us_east_1_sends_no_location_constraint() {
        let (endpoint, seen) = spawn_fake_s3(StatusCode::NOT_FOUND, (StatusCode::OK, "")).await;
        let store = store_for(&endpoint, "us-east-1").await;

        store.create_bucket("mybucket").await.unwrap();
        let requests = seen.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].body.contains("LocationConstraint"));
    }
}
