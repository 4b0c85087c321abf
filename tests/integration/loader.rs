use crate::utils::{contact_schema, memory_loader, memory_store};
use formrelay::commands;
use formrelay::schema::DEFAULT_FORM_SLUG;

#[tokio::test]
async fn resolve_by_slug_and_id() {
    let loader = memory_loader(memory_store().await);
    let id = loader.save(contact_schema("contact")).await.unwrap();

    let by_slug = loader.resolve("contact").await.unwrap();
    let by_id = loader.resolve(&id.to_string()).await.unwrap();
    assert_eq!(by_slug.id, id);
    assert_eq!(by_id.slug, "contact");

    let err = loader.resolve("nope").await.unwrap_err();
    assert_eq!(err.code(), "form_not_found");
    assert_eq!(err.status(), 404);
    assert_eq!(loader.resolve("0").await.unwrap_err().code(), "form_not_found");
}

#[tokio::test]
async fn save_evicts_cached_schema() {
    let loader = memory_loader(memory_store().await);
    let id = loader.save(contact_schema("contact")).await.unwrap();
    assert_eq!(loader.resolve("contact").await.unwrap().title, "Contact");
    assert_eq!(loader.resolve(&id.to_string()).await.unwrap().title, "Contact");

    let mut updated = contact_schema("contact");
    updated.id = id;
    updated.title = "Say hello".into();
    loader.save(updated).await.unwrap();

    assert_eq!(loader.resolve("contact").await.unwrap().title, "Say hello");
    assert_eq!(loader.resolve(&id.to_string()).await.unwrap().title, "Say hello");
}

#[tokio::test]
async fn slug_change_evicts_old_slug() {
    let loader = memory_loader(memory_store().await);
    let id = loader.save(contact_schema("contact")).await.unwrap();
    loader.resolve("contact").await.unwrap();

    let mut renamed = contact_schema("hello");
    renamed.id = id;
    loader.save(renamed).await.unwrap();

    assert_eq!(loader.resolve("contact").await.unwrap_err().code(), "form_not_found");
    assert_eq!(loader.resolve("hello").await.unwrap().id, id);
}

#[tokio::test]
async fn delete_evicts_cached_schema() {
    let loader = memory_loader(memory_store().await);
    loader.save(contact_schema("contact")).await.unwrap();
    loader.resolve("contact").await.unwrap();

    assert!(loader.delete("contact").await.unwrap());
    assert!(!loader.delete("contact").await.unwrap());
    assert_eq!(loader.resolve("contact").await.unwrap_err().code(), "form_not_found");
}

#[tokio::test]
async fn email_without_recipients_is_misconfigured() {
    let loader = memory_loader(memory_store().await);
    let mut schema = contact_schema("contact");
    schema.email.recipients = "  ".into();
    loader.save(schema).await.unwrap();

    let err = loader.resolve("contact").await.unwrap_err();
    assert_eq!(err.code(), "form_config_error");
    assert_eq!(err.status(), 500);

    // fixing the form takes effect immediately
    let mut fixed = loader.lookup("contact").await.unwrap().unwrap();
    fixed.email.recipients = "team@example.com".into();
    loader.save(fixed).await.unwrap();
    assert!(loader.resolve("contact").await.is_ok());
}

#[tokio::test]
async fn invalid_pattern_is_refused() {
    let loader = memory_loader(memory_store().await);
    let schema = formrelay::schema::FormSchema::from_json(
        r#"{"slug": "broken", "fields": [{"name": "zip", "type": "text", "pattern": "[0-9"}]}"#,
    )
    .unwrap();
    assert!(loader.save(schema).await.is_err());
    assert!(loader.lookup("broken").await.unwrap().is_none());
}

#[tokio::test]
async fn bootstrap_creates_contact_form_once() {
    let loader = memory_loader(memory_store().await);
    let id = commands::bootstrap(&loader, "owner@example.com")
        .await
        .unwrap()
        .unwrap();
    assert!(commands::bootstrap(&loader, "owner@example.com")
        .await
        .unwrap()
        .is_none());

    let schema = loader.resolve(DEFAULT_FORM_SLUG).await.unwrap();
    assert_eq!(schema.id, id);
    assert_eq!(schema.email.recipients, "owner@example.com");
    assert_eq!(
        schema.field_names(),
        vec!["name", "email", "phone", "message"]
    );
}

#[tokio::test]
async fn import_replaces_form_with_same_slug() {
    let loader = memory_loader(memory_store().await);
    let first = commands::import_form(
        &loader,
        r#"{"slug": "quote", "title": "Quote", "fields": [{"name": "budget", "type": "number"}]}"#,
    )
    .await
    .unwrap();
    let second = commands::import_form(
        &loader,
        r#"{"slug": "quote", "title": "Request a quote", "fields": [{"name": "budget"}]}"#,
    )
    .await
    .unwrap();
    assert_eq!(first, second);

    let forms = commands::list_forms(&loader, None).await.unwrap();
    assert_eq!(forms.len(), 1);
    assert_eq!(forms[0].title, "Request a quote");

    assert!(commands::import_form(&loader, "{not json").await.is_err());
    assert!(commands::submissions(&loader, "missing").await.is_err());
    assert!(commands::submissions(&loader, "quote").await.unwrap().is_empty());
}
