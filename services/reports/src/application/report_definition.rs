/// レポート定義
///
/// レポート種別ごとに「どのクエリを」「どの結合キーで」「どのスキーマで」出力するかを定義する。
/// ランナーはこのトレイトだけを見て、ディーラーごとの集計と出力を行う。
use async_trait::async_trait;
use futures::future::try_join_all;

use crate::domain::{
    ConsolidatedRow, DealerConnectionInfo, JobRequirements, QueryRow, ReportPeriod, ReportSchema,
};
use crate::infrastructure::{ConfigRequirements, QueryError, QueryRowSource, ReportQuery};

/// ディーラー接続情報の取得元
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectorySource {
    /// インデックスDB（dealerIDs）
    IndexDatabase,
    /// ディーラーAPI（dealershipIntegralinkCodes）
    DealerApi,
}

/// レポート種別の定義
#[async_trait]
pub trait ReportDefinition: Send + Sync {
    /// ログ用の識別名（例: `recall_bdc`）
    fn name(&self) -> &'static str;

    /// メール件名などに使う表示名
    fn title(&self) -> &'static str;

    /// オブジェクトキーのファイル名部分
    fn slug(&self) -> &'static str;

    /// オブジェクトキーの先頭ディレクトリ
    fn key_prefix(&self) -> &'static str;

    fn schema(&self) -> ReportSchema;

    /// ジョブペイロードの必須項目
    fn job_requirements(&self) -> JobRequirements;

    fn directory_source(&self) -> DirectorySource;

    /// 必要な設定グループ
    fn config_requirements(&self) -> ConfigRequirements {
        match self.directory_source() {
            DirectorySource::IndexDatabase => ConfigRequirements::INDEX_DB_WITH_EMAIL,
            DirectorySource::DealerApi => ConfigRequirements::DIRECTORY_API_WITH_CALLBACK,
        }
    }

    /// ディーラーを識別するフィールド（集計失敗時の行にも使う）
    fn identity(&self, dealer: &DealerConnectionInfo) -> QueryRow {
        dealer.identity_row()
    }

    /// 1ディーラー分の集計を行い、結合済みの行を返す
    async fn collect(
        &self,
        source: &dyn QueryRowSource,
        dealer: &DealerConnectionInfo,
        period: &ReportPeriod,
    ) -> Result<Vec<ConsolidatedRow>, QueryError>;
}

/// クエリ群を同時に発行し、発行順に結果を返す
///
/// 1つでも失敗すればそのエラーを返す。
pub(crate) async fn fetch_sets(
    source: &dyn QueryRowSource,
    queries: &[ReportQuery],
) -> Result<Vec<Vec<QueryRow>>, QueryError> {
    try_join_all(queries.iter().map(|query| source.fetch_rows(query))).await
}
