use crate::utils::{contact_schema, memory_store};
use formrelay::error::StoreError;
use formrelay::store::{FormQuery, SubmissionRecord};
use serde_json::json;

fn record(form_id: i64, name: &str) -> SubmissionRecord {
    SubmissionRecord {
        id: 0,
        form_id,
        form_title: "Contact".into(),
        title: format!("Contact - {name} - 01.02.2024 10:00:00"),
        data: json!({"name": name, "tags": ["a", "b"]})
            .as_object()
            .cloned()
            .unwrap(),
        ip: "192.0.2.1".into(),
        user_agent: "curl/8".into(),
        page_url: "https://example.com/contact".into(),
        submitted_at: "2024-02-01 10:00:00".into(),
    }
}

#[tokio::test]
async fn form_round_trip_by_slug_and_id() {
    let store = memory_store().await;
    let schema = contact_schema("contact");
    let id = store.save_form(&schema).await.unwrap();
    assert!(id > 0);

    let by_slug = store.get_form_by_slug("contact").await.unwrap().unwrap();
    assert_eq!(by_slug.id, id);
    assert_eq!(by_slug.fields, schema.fields);
    assert_eq!(by_slug.email, schema.email);

    let by_id = store.get_form_by_id(id).await.unwrap().unwrap();
    assert_eq!(by_id.slug, "contact");
    assert!(store.get_form_by_slug("missing").await.unwrap().is_none());
    assert!(store.get_form_by_id(id + 100).await.unwrap().is_none());
}

#[tokio::test]
async fn update_keeps_id_and_rejects_duplicate_slug() {
    let store = memory_store().await;
    let id = store.save_form(&contact_schema("contact")).await.unwrap();
    let other = store.save_form(&contact_schema("quote")).await.unwrap();

    let mut renamed = store.get_form_by_id(id).await.unwrap().unwrap();
    renamed.title = "Get in touch".into();
    assert_eq!(store.save_form(&renamed).await.unwrap(), id);
    assert_eq!(
        store.get_form_by_slug("contact").await.unwrap().unwrap().title,
        "Get in touch"
    );

    let mut clash = store.get_form_by_id(other).await.unwrap().unwrap();
    clash.slug = "contact".into();
    assert!(matches!(
        store.save_form(&clash).await,
        Err(StoreError::DuplicateSlug(slug)) if slug == "contact"
    ));
}

#[tokio::test]
async fn list_pages_and_search() {
    let store = memory_store().await;
    for (slug, title) in [
        ("alpha", "Alpha survey"),
        ("beta", "Beta signup"),
        ("gamma", "Gamma survey"),
        ("percent", "100% match"),
    ] {
        let mut schema = contact_schema(slug);
        schema.title = title.into();
        store.save_form(&schema).await.unwrap();
    }

    let (page, total) = store
        .list_forms(&FormQuery {
            page: 1,
            per_page: 2,
            search: None,
        })
        .await
        .unwrap();
    assert_eq!(total, 4);
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].title, "100% match");

    let (page, total) = store
        .list_forms(&FormQuery {
            page: 2,
            per_page: 3,
            search: None,
        })
        .await
        .unwrap();
    assert_eq!(total, 4);
    assert_eq!(page.len(), 1);

    let (found, total) = store
        .list_forms(&FormQuery {
            search: Some("SURVEY".into()),
            ..FormQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 2);
    let slugs: Vec<_> = found.iter().map(|f| f.slug.as_str()).collect();
    assert_eq!(slugs, vec!["alpha", "gamma"]);

    let (found, _) = store
        .list_forms(&FormQuery {
            search: Some("%".into()),
            ..FormQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].slug, "percent");
}

#[tokio::test]
async fn submissions_are_kept_per_form() {
    let store = memory_store().await;
    let contact = store.save_form(&contact_schema("contact")).await.unwrap();
    let quote = store.save_form(&contact_schema("quote")).await.unwrap();

    let first = store.store_submission(&record(contact, "Ann")).await.unwrap();
    let second = store.store_submission(&record(contact, "Bob")).await.unwrap();
    store.store_submission(&record(quote, "Cy")).await.unwrap();
    assert!(second > first);

    let stored = store.list_submissions(contact).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].id, first);
    assert_eq!(stored[0].data["name"], "Ann");
    assert_eq!(stored[0].data["tags"], json!(["a", "b"]));
    assert_eq!(stored[1].title, "Contact - Bob - 01.02.2024 10:00:00");
}

#[tokio::test]
async fn delete_form() {
    let store = memory_store().await;
    let id = store.save_form(&contact_schema("contact")).await.unwrap();
    assert!(store.delete_form(id).await.unwrap());
    assert!(!store.delete_form(id).await.unwrap());
    assert!(store.get_form_by_slug("contact").await.unwrap().is_none());
}
