//! レポート保存モジュール
//!
//! 生成したレポートファイルをS3に保存し、ダウンロード用の署名付きURLを発行する。

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use thiserror::Error;
use tracing::{info, warn};

/// 署名付きURLの有効期限の上限（S3の制約で7日）
pub const MAX_LINK_EXPIRY: Duration = Duration::from_secs(604_800);

/// レポート保存のエラー型
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StorageError {
    /// アップロード失敗
    #[error("S3へのアップロードに失敗: bucket={bucket}, key={key}, message={message}")]
    Upload {
        bucket: String,
        key: String,
        message: String,
    },

    /// 署名付きURLの発行失敗
    #[error("署名付きURLの発行に失敗: key={key}, message={message}")]
    Presign { key: String, message: String },
}

/// レポート保存先の抽象（テスト用）
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// 保存先バケット名
    fn bucket(&self) -> &str;

    /// レポートをキーに保存する
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StorageError>;

    /// ダウンロード用URLを発行する（有効期限は上限で切り詰める）
    async fn download_link(&self, key: &str, expiry: Duration) -> Result<String, StorageError>;
}

/// AWS S3を使用したレポート保存実装
pub struct S3ReportStore {
    client: S3Client,
    bucket: String,
}

impl std::fmt::Debug for S3ReportStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ReportStore")
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl S3ReportStore {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// AWS設定からデフォルトのクライアントを作成
    pub async fn from_config(bucket: impl Into<String>) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(S3Client::new(&config), bucket)
    }
}

#[async_trait]
impl ReportStore for S3ReportStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        let size = body.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                warn!(bucket = %self.bucket, s3_key = %key, error = %e, "S3 PutObjectエラー");
                StorageError::Upload {
                    bucket: self.bucket.clone(),
                    key: key.to_string(),
                    message: e.to_string(),
                }
            })?;

        info!(bucket = %self.bucket, s3_key = %key, size = size, "レポートをアップロード");
        Ok(())
    }

    async fn download_link(&self, key: &str, expiry: Duration) -> Result<String, StorageError> {
        let presign_error = |message: String| StorageError::Presign {
            key: key.to_string(),
            message,
        };

        let config = PresigningConfig::expires_in(expiry.min(MAX_LINK_EXPIRY))
            .map_err(|e| presign_error(e.to_string()))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(|e| presign_error(e.to_string()))?;

        Ok(request.uri().to_string())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// 保存されたオブジェクト
    #[derive(Debug, Clone, PartialEq)]
    pub struct StoredObject {
        pub key: String,
        pub body: Vec<u8>,
        pub content_type: String,
    }

    /// テスト用のReportStore
    #[derive(Debug, Clone)]
    pub struct MockReportStore {
        bucket: String,
        objects: Arc<Mutex<Vec<StoredObject>>>,
        links: Arc<Mutex<Vec<(String, Duration)>>>,
        next_error: Arc<Mutex<Option<StorageError>>>,
    }

    impl MockReportStore {
        pub fn new(bucket: &str) -> Self {
            Self {
                bucket: bucket.to_string(),
                objects: Arc::new(Mutex::new(Vec::new())),
                links: Arc::new(Mutex::new(Vec::new())),
                next_error: Arc::new(Mutex::new(None)),
            }
        }

        /// 次のput呼び出しでエラーを返すよう設定
        pub fn set_next_error(&self, error: StorageError) {
            *self.next_error.lock().unwrap() = Some(error);
        }

        pub fn objects(&self) -> Vec<StoredObject> {
            self.objects.lock().unwrap().clone()
        }

        pub fn links(&self) -> Vec<(String, Duration)> {
            self.links.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ReportStore for MockReportStore {
        fn bucket(&self) -> &str {
            &self.bucket
        }

        async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
            if let Some(error) = self.next_error.lock().unwrap().take() {
                return Err(error);
            }
            self.objects.lock().unwrap().push(StoredObject {
                key: key.to_string(),
                body,
                content_type: content_type.to_string(),
            });
            Ok(())
        }

        async fn download_link(&self, key: &str, expiry: Duration) -> Result<String, StorageError> {
            self.links.lock().unwrap().push((key.to_string(), expiry));
            Ok(format!("https://{}.s3.amazonaws.com/{}?signed", self.bucket, key))
        }
    }

    #[test]
    fn test_storage_error_display() {
        let error = StorageError::Upload {
            bucket: "reports".to_string(),
            key: "Video_Reports/a.csv".to_string(),
            message: "AccessDenied".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "S3へのアップロードに失敗: bucket=reports, key=Video_Reports/a.csv, message=AccessDenied"
        );
    }

    #[tokio::test]
    async fn test_mock_store_records_objects() {
        let store = MockReportStore::new("reports");

        store
            .put("a/b.csv", b"x,y\n".to_vec(), "text/csv")
            .await
            .unwrap();

        let objects = store.objects();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].key, "a/b.csv");
        assert_eq!(objects[0].content_type, "text/csv");
    }

    #[tokio::test]
    async fn test_presigned_link_is_generated_offline() {
        // 署名はローカル計算のみなのでネットワークなしで検証できる
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new("us-east-1"))
            .credentials_provider(aws_sdk_s3::config::Credentials::new(
                "AKIDEXAMPLE",
                "secret",
                None,
                None,
                "test",
            ))
            .build();
        let store = S3ReportStore::new(S3Client::from_conf(config), "unotifi-reports");

        let link = store
            .download_link("Video_Reports/2021/06/18/video-report.csv", Duration::from_secs(30 * 86_400))
            .await
            .unwrap();

        assert!(link.contains("unotifi-reports"));
        assert!(link.contains("Video_Reports/2021/06/18/video-report.csv"));
        assert!(link.contains("X-Amz-Expires=604800"));
    }
}
