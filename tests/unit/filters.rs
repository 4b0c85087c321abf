use formrelay::config::{FilterConfig, LimitsConfig};
use formrelay::filters::factory::{
    FilterFactoryError, GuardDeps, create_filter, create_filter_chain,
};
use formrelay::filters::size::data_size;
use formrelay::filters::GuardContext;
use formrelay::limits::MemoryRateLimiter;
use formrelay::pipeline::RequestMeta;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;

fn deps() -> GuardDeps {
    GuardDeps {
        limits: LimitsConfig::default(),
        rate_limiter: Arc::new(MemoryRateLimiter::new(
            Duration::from_secs(10),
            Duration::from_secs(15),
        )),
    }
}

fn guard(name: &str, parameters: Value) -> FilterConfig {
    FilterConfig {
        name: name.to_string(),
        parameters: parameters.as_object().cloned().unwrap_or_default(),
    }
}

fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

fn meta(ip: &str) -> RequestMeta {
    RequestMeta {
        ip: ip.to_string(),
        ..RequestMeta::default()
    }
}

#[tokio::test]
async fn default_chain_order() {
    let chain = create_filter_chain(&[], &deps()).unwrap();
    assert_eq!(
        chain.filter_names(),
        vec![
            "HoneypotFilter",
            "RateLimitFilter",
            "PresenceFilter",
            "FieldCountFilter",
            "SizeFilter"
        ]
    );
}

#[tokio::test]
async fn honeypot_runs_before_rate_limit() {
    let chain = create_filter_chain(&[], &deps()).unwrap();
    let spam = object(json!({"name": "bot", "fr_hp": "http://spam"}));
    let requester = meta("10.0.0.1");
    let ctx = GuardContext {
        form: "contact",
        data: &spam,
        file_count: 0,
        meta: &requester,
    };
    assert_eq!(chain.validate(&ctx).await.unwrap_err().code(), "spam_detected");

    // the rejected spam did not consume the requester's window
    let ham = object(json!({"name": "Ann", "fr_hp": ""}));
    let ctx = GuardContext {
        form: "contact",
        data: &ham,
        file_count: 0,
        meta: &requester,
    };
    assert!(chain.validate(&ctx).await.is_ok());
    assert_eq!(chain.validate(&ctx).await.unwrap_err().code(), "rate_limited");
}

#[tokio::test]
async fn rate_limit_is_per_form_and_requester() {
    let chain = create_filter_chain(&[guard("RateLimitFilter", json!({}))], &deps()).unwrap();
    let data = object(json!({"name": "Ann"}));
    let a = meta("10.0.0.1");
    let b = meta("10.0.0.2");
    for (form, requester) in [("contact", &a), ("contact", &b), ("quote", &a)] {
        let ctx = GuardContext {
            form,
            data: &data,
            file_count: 0,
            meta: requester,
        };
        assert!(chain.validate(&ctx).await.is_ok(), "{form} {}", requester.ip);
    }
    let ctx = GuardContext {
        form: "contact",
        data: &data,
        file_count: 0,
        meta: &a,
    };
    let err = chain.validate(&ctx).await.unwrap_err();
    assert_eq!(err.status(), 429);
}

#[tokio::test]
async fn configured_limits_override_defaults() {
    let chain = create_filter_chain(
        &[
            guard("FieldCountFilter", json!({"max_fields": 2})),
            guard("SizeFilter", json!({"max_bytes": 20})),
        ],
        &deps(),
    )
    .unwrap();
    let requester = meta("10.0.0.1");

    let three = object(json!({"a": "1", "b": "2", "c": "3"}));
    let ctx = GuardContext {
        form: "f",
        data: &three,
        file_count: 0,
        meta: &requester,
    };
    assert_eq!(chain.validate(&ctx).await.unwrap_err().code(), "too_many_fields");

    let big = object(json!({"message": "x".repeat(30)}));
    let ctx = GuardContext {
        form: "f",
        data: &big,
        file_count: 0,
        meta: &requester,
    };
    assert_eq!(chain.validate(&ctx).await.unwrap_err().code(), "data_too_large");
}

#[tokio::test]
async fn empty_payload_without_files_is_invalid() {
    let chain = create_filter_chain(&[guard("PresenceFilter", json!({}))], &deps()).unwrap();
    let empty = Map::new();
    let requester = meta("10.0.0.1");
    let ctx = GuardContext {
        form: "f",
        data: &empty,
        file_count: 0,
        meta: &requester,
    };
    assert_eq!(chain.validate(&ctx).await.unwrap_err().code(), "invalid_data");

    let with_file = GuardContext {
        file_count: 1,
        ..ctx
    };
    assert!(chain.validate(&with_file).await.is_ok());
}

#[test]
fn factory_errors() {
    assert!(matches!(
        create_filter(&guard("ModerationFilter", json!({})), &deps()),
        Err(FilterFactoryError::UnknownFilter(name)) if name == "ModerationFilter"
    ));
    assert!(matches!(
        create_filter(&guard("FieldCountFilter", json!({"max_fields": 0})), &deps()),
        Err(FilterFactoryError::InvalidParameters(_))
    ));
    assert!(matches!(
        create_filter(&guard("SizeFilter", json!({"max_bytes": "big"})), &deps()),
        Err(FilterFactoryError::InvalidParameters(_))
    ));
}

#[test]
fn data_size_counts_nested_keys_and_values() {
    // "name" + "Ann" = 7
    assert_eq!(data_size(&object(json!({"name": "Ann"}))), 7);
    // "items" + ("0" + "qty" + "3") = 5 + 5
    assert_eq!(data_size(&object(json!({"items": [{"qty": 3}]}))), 10);
}
