//! CSVエンコード
//!
//! ヘッダー行（スキーマのタイトル）に続けて、ReportRowを1行ずつ書き出す。

use thiserror::Error;

use crate::domain::{ReportRow, ReportSchema};

/// CSVのContent-Type
pub const CSV_CONTENT_TYPE: &str = "text/csv";

/// CSVファイルの拡張子
pub const CSV_EXTENSION: &str = "csv";

/// エンコードのエラー型
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("CSV書き込みエラー: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSVバッファの取り出しに失敗: {0}")]
    Flush(String),
}

/// レポート行をCSVのバイト列にエンコードする
pub fn encode_csv(schema: &ReportSchema, rows: &[ReportRow]) -> Result<Vec<u8>, EncodeError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    writer.write_record(schema.titles())?;
    for row in rows {
        writer.write_record(row.to_record())?;
    }

    writer
        .into_inner()
        .map_err(|e| EncodeError::Flush(e.error().to_string()))
}
