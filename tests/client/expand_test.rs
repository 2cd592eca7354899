//! Placeholder expansion properties.

use serde_json::json;
use sqlbridge::client::expand;
use sqlbridge::BridgeError;

#[test]
fn test_identity_for_all_scalar_params() {
    let sql = "INSERT INTO t (a, b, c, d) VALUES (?, ?, ?, ?)";
    let params = vec![json!(1), json!("two"), json!(3.5), json!(null)];
    let expansion = expand(sql, &params).unwrap();
    assert_eq!(expansion.sql, sql);
    assert_eq!(expansion.params, params);
}

#[test]
fn test_missing_params_fail_before_sending() {
    let err = expand("SELECT ?, ?, ?", &[json!(1)]).unwrap_err();
    match err {
        BridgeError::ParameterCountMismatch { placeholders, params } => {
            assert_eq!(placeholders, 2);
            assert_eq!(params, 1);
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_sequence_expansion_preserves_surrounding_order() {
    let expansion = expand(
        "UPDATE t SET x = ? WHERE id IN (?) AND y = ?",
        &[json!(5), json!([1, 2, 3]), json!("after")],
    )
    .unwrap();
    assert_eq!(
        expansion.sql,
        "UPDATE t SET x = ? WHERE id IN (?,?,?) AND y = ?"
    );
    assert_eq!(
        expansion.params,
        vec![json!(5), json!(1), json!(2), json!(3), json!("after")]
    );
}

#[test]
fn test_sequence_marker_count_matches_length() {
    for k in 0..6 {
        let items: Vec<i64> = (0..k).collect();
        let expansion = expand("IN (?)", &[json!(items)]).unwrap();
        let markers = expansion.sql.matches('?').count();
        assert_eq!(markers, k as usize);
        assert_eq!(expansion.params.len(), k as usize);
    }
}

#[test]
fn test_mapping_expansion_for_set_clause() {
    let expansion = expand(
        "UPDATE t SET ? WHERE id = ?",
        &[json!({"name": "x", "age": 30}), json!(1)],
    )
    .unwrap();
    assert_eq!(expansion.sql, "UPDATE t SET name = ?,age = ? WHERE id = ?");
    assert_eq!(expansion.params, vec![json!("x"), json!(30), json!(1)]);
}

#[test]
fn test_mismatch_never_partially_consumes() {
    // Failure must happen before anything could cross the wire, so there is
    // no partially expanded output to observe.
    assert!(expand("? ?", &[]).is_err());
    assert!(expand("a = ? AND b = ?", &[json!([1, 2, 3])]).is_err());
}
