use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde_json::{Map, Value};

use crate::error::StreamError;

pub const REQUIRED_FIELDS: [&str; 3] = ["timestamp", "temperature_celsius", "humidity_percent"];

/// Jeden ověřený záznam ze senzoru.
#[derive(Clone, Debug, PartialEq)]
pub struct SensorReading {
    pub timestamp: DateTime<Utc>,
    pub temperature_celsius: Option<f64>,
    pub humidity_percent: Option<f64>,
    pub sensor_id: Option<String>,
    pub location: Option<String>,
    pub process_stage: Option<String>,
}

/// Zpracuje jeden řádek bez oddělovače `\n`.
///
/// Prázdný řádek (i jen s bílými znaky) vrací `Ok(None)`. Chyba je vždy
/// `StreamError::Decode` nebo `StreamError::Validation`.
pub fn parse_line(line: &[u8], received_at: DateTime<Utc>) -> Result<Option<SensorReading>, StreamError> {
    let text = std::str::from_utf8(line).map_err(|e| StreamError::Decode(e.to_string()))?.trim();
    if text.is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(text).map_err(|e| StreamError::Decode(e.to_string()))?;
    let Value::Object(record) = value else {
        return Err(StreamError::Validation("záznam není JSON objekt".into()));
    };

    let missing: Vec<&str> = REQUIRED_FIELDS.iter().copied().filter(|key| !record.contains_key(*key)).collect();
    if !missing.is_empty() {
        return Err(StreamError::Validation(format!("chybí pole: {}", missing.join(", "))));
    }

    let timestamp = match &record["timestamp"] {
        Value::Null => received_at,
        Value::String(s) if s.trim().is_empty() => received_at,
        Value::String(s) => parse_timestamp(s.trim())?,
        _ => return Err(StreamError::Validation("timestamp není řetězec".into())),
    };

    Ok(Some(SensorReading {
        timestamp,
        temperature_celsius: measurement(&record, "temperature_celsius")?,
        humidity_percent: measurement(&record, "humidity_percent")?,
        sensor_id: text_field(&record, "sensor_id"),
        location: text_field(&record, "location"),
        process_stage: text_field(&record, "process_stage"),
    }))
}

/// ISO-8601 čas. `Z` i explicitní posun se převádí na UTC, čas bez posunu
/// se bere jako místní.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StreamError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .map_err(|e| StreamError::Validation(format!("neplatný timestamp '{}': {}", s, e)))?;
    naive
        .and_local_timezone(Local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| StreamError::Validation(format!("neexistující místní čas '{}'", s)))
}

fn measurement(record: &Map<String, Value>, key: &str) -> Result<Option<f64>, StreamError> {
    match &record[key] {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        _ => Err(StreamError::Validation(format!("{} není číslo", key))),
    }
}

fn text_field(record: &Map<String, Value>, key: &str) -> Option<String> {
    record.get(key).and_then(Value::as_str).map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn arrival() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn parses_complete_record() {
        let line = br#"{"timestamp":"2024-05-01T10:15:30Z","temperature_celsius":37.6,"humidity_percent":55.2,"sensor_id":"dht22-1","location":"rak A","process_stage":"inkubasi"}"#;
        let reading = parse_line(line, arrival()).unwrap().unwrap();
        assert_eq!(reading.timestamp, Utc.with_ymd_and_hms(2024, 5, 1, 10, 15, 30).unwrap());
        assert_eq!(reading.temperature_celsius, Some(37.6));
        assert_eq!(reading.humidity_percent, Some(55.2));
        assert_eq!(reading.sensor_id.as_deref(), Some("dht22-1"));
        assert_eq!(reading.location.as_deref(), Some("rak A"));
        assert_eq!(reading.process_stage.as_deref(), Some("inkubasi"));
    }

    #[test]
    fn offset_is_normalized_to_utc() {
        let line = br#"{"timestamp":"2024-05-01T17:15:30+07:00","temperature_celsius":25,"humidity_percent":60}"#;
        let reading = parse_line(line, arrival()).unwrap().unwrap();
        assert_eq!(reading.timestamp, Utc.with_ymd_and_hms(2024, 5, 1, 10, 15, 30).unwrap());
        assert_eq!(reading.temperature_celsius, Some(25.0));
    }

    #[test]
    fn missing_timestamp_is_validation_error() {
        let err = parse_line(br#"{"temperature_celsius":25.0,"humidity_percent":60.0}"#, arrival()).unwrap_err();
        match err {
            StreamError::Validation(msg) => assert!(msg.contains("timestamp")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn not_json_is_decode_error() {
        let err = parse_line(b"not-json", arrival()).unwrap_err();
        assert!(matches!(err, StreamError::Decode(_)));
    }

    #[test]
    fn invalid_utf8_is_decode_error() {
        let err = parse_line(&[0xff, 0xfe, b'{', b'}'], arrival()).unwrap_err();
        assert!(matches!(err, StreamError::Decode(_)));
    }

    #[test]
    fn blank_lines_are_skipped() {
        assert!(parse_line(b"", arrival()).unwrap().is_none());
        assert!(parse_line(b"  \t\r", arrival()).unwrap().is_none());
    }

    #[test]
    fn null_or_empty_timestamp_uses_arrival_time() {
        let reading = parse_line(br#"{"timestamp":null,"temperature_celsius":25,"humidity_percent":60}"#, arrival())
            .unwrap()
            .unwrap();
        assert_eq!(reading.timestamp, arrival());

        let reading = parse_line(br#"{"timestamp":"","temperature_celsius":25,"humidity_percent":60}"#, arrival())
            .unwrap()
            .unwrap();
        assert_eq!(reading.timestamp, arrival());
    }

    #[test]
    fn null_measurement_is_absent_value() {
        let reading = parse_line(br#"{"timestamp":"2024-05-01T10:00:00Z","temperature_celsius":null,"humidity_percent":61.5}"#, arrival())
            .unwrap()
            .unwrap();
        assert_eq!(reading.temperature_celsius, None);
        assert_eq!(reading.humidity_percent, Some(61.5));
    }

    #[test]
    fn wrong_value_types_are_rejected() {
        let err = parse_line(br#"{"timestamp":"2024-05-01T10:00:00Z","temperature_celsius":"hot","humidity_percent":60}"#, arrival())
            .unwrap_err();
        assert!(matches!(err, StreamError::Validation(_)));

        let err = parse_line(br#"{"timestamp":"yesterday","temperature_celsius":25,"humidity_percent":60}"#, arrival())
            .unwrap_err();
        assert!(matches!(err, StreamError::Validation(_)));

        let err = parse_line(b"[1, 2, 3]", arrival()).unwrap_err();
        assert!(matches!(err, StreamError::Validation(_)));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let line = br#"{"timestamp":"2024-05-01T10:00:00Z","temperature_celsius":25,"humidity_percent":60,"battery":3.1}"#;
        assert!(parse_line(line, arrival()).unwrap().is_some());
    }

    #[test]
    fn naive_timestamp_is_local_time() {
        let parsed = parse_timestamp("2024-05-01T10:00:00").unwrap();
        let expected = NaiveDateTime::parse_from_str("2024-05-01 10:00:00", "%Y-%m-%d %H:%M:%S")
            .unwrap()
            .and_local_timezone(Local)
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(parsed, expected);
    }
}
