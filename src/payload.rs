use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::processor::{AnalysisReport, TIMESTAMP_FORMAT};

/// 违章记录（转发给记录服务）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentPayload {
    /// 流水号（文件名去掉扩展名）
    pub serial_no: String,
    /// 视频预签名链接
    pub video_url: String,
    /// YYYY-MM-DD
    pub incident_date: String,
    /// HH:MM:SS
    pub incident_time: String,
    pub violation_type: String,
    pub plate_no: String,
    pub location: String,
    /// 举报草稿
    pub ai_draft: String,
}

impl IncidentPayload {
    pub fn from_report(
        report: &AnalysisReport,
        serial_no: impl Into<String>,
        video_url: impl Into<String>,
        ai_draft: impl Into<String>,
    ) -> Self {
        let (incident_date, incident_time) = split_timestamp(&report.timestamp);
        Self {
            serial_no: serial_no.into(),
            video_url: video_url.into(),
            incident_date,
            incident_time,
            violation_type: report.category.clone(),
            plate_no: report.plate.clone(),
            location: report.location.clone(),
            ai_draft: ai_draft.into(),
        }
    }
}

/// 拆分为日期和时间，格式不对时整体作为日期、时间留空
pub fn split_timestamp(timestamp: &str) -> (String, String) {
    match NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT) {
        Ok(dt) => (
            dt.format("%Y-%m-%d").to_string(),
            dt.format("%H:%M:%S").to_string(),
        ),
        Err(_) => (timestamp.to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_splits_into_date_and_time() {
        assert_eq!(
            split_timestamp("2024-03-05 17:08:09"),
            ("2024-03-05".to_string(), "17:08:09".to_string())
        );
        assert_eq!(
            split_timestamp("yesterday"),
            ("yesterday".to_string(), String::new())
        );
    }

    #[test]
    fn payload_uses_camel_case_fields() {
        let payload = IncidentPayload {
            serial_no: "cam01_0001".to_string(),
            video_url: "https://example/v.mp4".to_string(),
            incident_date: "2024-03-05".to_string(),
            incident_time: "17:08:09".to_string(),
            violation_type: "신호위반".to_string(),
            plate_no: "12가3456".to_string(),
            location: "--".to_string(),
            ai_draft: "draft".to_string(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        for key in [
            "serialNo",
            "videoUrl",
            "incidentDate",
            "incidentTime",
            "violationType",
            "plateNo",
            "location",
            "aiDraft",
        ] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
    }
}
