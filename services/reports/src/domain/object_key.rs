// オブジェクトキー生成
//
// `<prefix>/YYYY/MM/DD/<slug>_<YYYY-MM-DD_HHMMSS>_<NNNNN>.<ext>` 形式の
// ストレージキーを組み立てる。時刻はすべてUTC。

use chrono::{DateTime, Utc};
use rand::Rng;

/// ランダムサフィックスの下限
pub const RANDOM_SUFFIX_MIN: u32 = 10_000;

/// ランダムサフィックスの上限（含む）
pub const RANDOM_SUFFIX_MAX: u32 = 99_999;

/// 5桁のランダムサフィックスを生成
pub fn random_suffix() -> u32 {
    rand::rng().random_range(RANDOM_SUFFIX_MIN..=RANDOM_SUFFIX_MAX)
}

/// 英数字以外を`_`に置き換える
fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// ストレージキーを生成
///
/// # 引数
/// * `prefix` - キーの先頭ディレクトリ（空文字列なら付与しない）
/// * `slug` - ファイル名部分（英数字以外は`_`に置換）
/// * `extension` - 拡張子（`csv`など）
/// * `now` - 生成時刻
/// * `suffix` - 衝突回避用の乱数
pub fn generate_object_key(
    prefix: &str,
    slug: &str,
    extension: &str,
    now: DateTime<Utc>,
    suffix: u32,
) -> String {
    let prefix = prefix.trim_matches('/');
    let directory = now.format("%Y/%m/%d");
    let timestamp = now.format("%Y-%m-%d_%H%M%S");
    let file_name = format!("{}_{}_{}.{}", sanitize(slug), timestamp, suffix, extension);

    if prefix.is_empty() {
        format!("{}/{}", directory, file_name)
    } else {
        format!("{}/{}/{}", prefix, directory, file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 6, 3, 7, 5, 9).unwrap()
    }

    #[test]
    fn test_key_layout() {
        let key = generate_object_key(
            "recall_bdc_reports",
            "recall-bdc-report",
            "csv",
            fixed_now(),
            12345,
        );

        assert_eq!(
            key,
            "recall_bdc_reports/2021/06/03/recall_bdc_report_2021-06-03_070509_12345.csv"
        );
    }

    #[test]
    fn test_prefix_slashes_are_normalized() {
        let key = generate_object_key("Video_Reports/", "video-report", "csv", fixed_now(), 10000);

        assert!(key.starts_with("Video_Reports/2021/06/03/"));
        assert!(!key.contains("//"));
    }

    #[test]
    fn test_empty_prefix() {
        let key = generate_object_key("", "report", "csv", fixed_now(), 99999);

        assert_eq!(key, "2021/06/03/report_2021-06-03_070509_99999.csv");
    }

    #[test]
    fn test_slug_is_sanitized() {
        let key = generate_object_key("p", "a b/c.d", "csv", fixed_now(), 10001);

        assert!(key.contains("/a_b_c_d_2021-06-03_070509_10001.csv"));
    }

    #[test]
    fn test_random_suffix_is_five_digits() {
        for _ in 0..1000 {
            let suffix = random_suffix();
            assert!((RANDOM_SUFFIX_MIN..=RANDOM_SUFFIX_MAX).contains(&suffix));
            assert_eq!(suffix.to_string().len(), 5);
        }
    }
}
