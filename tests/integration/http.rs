use crate::utils::{
    RecordingMailer, contact_schema, form_request, json_request, memory_store, read_json,
    test_dispatcher, test_router,
};
use axum::body::Body;
use axum::http::Request;
use formrelay::config::Config;
use formrelay::schema::{FieldDefinition, FieldKind, FileRules, FormSchema};
use formrelay::store::DynFormStore;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

const SUBMIT: &str = "/formrelay/v1/forms/contact/submit";

async fn setup(schema: FormSchema) -> (DynFormStore, Arc<RecordingMailer>, i64) {
    let store = memory_store().await;
    let id = store.save_form(&schema).await.unwrap();
    (store, Arc::new(RecordingMailer::default()), id)
}

fn valid_contact() -> serde_json::Value {
    json!({"name": "Alice", "email": "a@b.com", "message": "hi"})
}

#[tokio::test]
async fn successful_submission_reports_every_channel() {
    let (store, mailer, _) = setup(contact_schema("contact")).await;
    let app = test_router(Config::default(), store.clone(), test_dispatcher(mailer.clone(), store));

    let response = app.oneshot(json_request(SUBMIT, &valid_contact())).await.unwrap();
    let (status, body) = read_json(response).await;

    assert_eq!(status, 200);
    assert_eq!(
        body,
        json!({
            "success": true,
            "message": "Form submitted successfully",
            "delivery_results": {
                "email": {"success": true, "error": null, "enabled": true},
                "telegram": {"success": false, "error": null, "enabled": false},
                "google_sheets": {"success": false, "error": null, "enabled": false},
                "admin_storage": {"success": false, "error": null, "enabled": false}
            }
        })
    );

    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to.as_slice(), ["team@example.com"]);
    assert!(sent[0].html_body.contains("Alice"));
}

#[tokio::test]
async fn unknown_fields_are_rejected() {
    let (store, mailer, _) = setup(contact_schema("contact")).await;
    let app = test_router(Config::default(), store.clone(), test_dispatcher(mailer.clone(), store));

    let response = app
        .oneshot(json_request(SUBMIT, &json!({"name": "Alice", "extra_field": "x"})))
        .await
        .unwrap();
    let (status, body) = read_json(response).await;

    assert_eq!(status, 400);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "unauthorized_fields");
    assert_eq!(body["message"], "Unauthorized fields detected: extra_field");
    assert_eq!(body["unauthorized_fields"], json!(["extra_field"]));
    assert_eq!(body["allowed_fields"], json!(["name", "email", "message"]));
    assert!(mailer.sent().is_empty());
}

#[tokio::test]
async fn configured_extra_fields_are_accepted() {
    let (store, mailer, _) = setup(contact_schema("contact")).await;
    let config = Config::from_toml("[[allowed_fields]]\nform = \"contact\"\nfields = [\"utm_source\"]").unwrap();
    let app = test_router(config, store.clone(), test_dispatcher(mailer, store));

    let mut data = valid_contact();
    data["utm_source"] = json!("newsletter");
    let (status, _) = read_json(app.oneshot(json_request(SUBMIT, &data)).await.unwrap()).await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn invalid_recipient_fails_delivery() {
    let mut schema = contact_schema("contact");
    schema.email.recipients = "not-an-email".into();
    let (store, mailer, _) = setup(schema).await;
    let app = test_router(Config::default(), store.clone(), test_dispatcher(mailer, store));

    let (status, body) =
        read_json(app.oneshot(json_request(SUBMIT, &valid_contact())).await.unwrap()).await;

    assert_eq!(status, 500);
    assert_eq!(body["code"], "send_error");
    assert_eq!(
        body["delivery_results"]["email"],
        json!({"enabled": true, "success": false, "error": "Invalid email address: not-an-email"})
    );
}

#[tokio::test]
async fn one_working_channel_is_enough() {
    let mut schema = contact_schema("contact");
    schema.save_to_admin = true;
    let (store, _, id) = setup(schema).await;
    let mailer = Arc::new(RecordingMailer::failing());
    let app = test_router(Config::default(), store.clone(), test_dispatcher(mailer, store.clone()));

    let (status, body) =
        read_json(app.oneshot(json_request(SUBMIT, &valid_contact())).await.unwrap()).await;

    assert_eq!(status, 200);
    assert_eq!(body["delivery_results"]["email"]["success"], false);
    assert_eq!(body["delivery_results"]["email"]["error"], "Failed to send email");
    assert_eq!(body["delivery_results"]["admin_storage"]["success"], true);

    let records = store.list_submissions(id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].user_agent, "formrelay-tests");
    assert_eq!(records[0].ip, "unknown");
}

#[tokio::test]
async fn second_submission_within_window_is_rate_limited() {
    let (store, mailer, _) = setup(contact_schema("contact")).await;
    let app = test_router(Config::default(), store.clone(), test_dispatcher(mailer.clone(), store));

    let first = app
        .clone()
        .oneshot(json_request(SUBMIT, &valid_contact()))
        .await
        .unwrap();
    assert_eq!(first.status(), 200);

    let (status, body) =
        read_json(app.oneshot(json_request(SUBMIT, &valid_contact())).await.unwrap()).await;
    assert_eq!(status, 429);
    assert_eq!(body["code"], "rate_limited");
    assert_eq!(mailer.sent().len(), 1);
}

#[tokio::test]
async fn nested_item_validation() {
    let schema = FormSchema::from_json(
        r#"{
            "slug": "order",
            "title": "Order",
            "save_to_admin": true,
            "fields": [
                {"name": "products", "label": "Products", "type": "array_of_objects", "fields": [
                    {"name": "name", "label": "Name", "required": true},
                    {"name": "qty", "label": "Qty", "type": "number", "min": 0}
                ]}
            ]
        }"#,
    )
    .unwrap();
    let (store, mailer, _) = setup(schema).await;
    let app = test_router(Config::default(), store.clone(), test_dispatcher(mailer, store));

    let data = json!({"products": [{"name": "Pen", "qty": 3}, {"name": "", "qty": -1}]});
    let (status, body) = read_json(
        app.oneshot(json_request("/formrelay/v1/forms/order/submit", &data))
            .await
            .unwrap(),
    )
    .await;

    assert_eq!(status, 400);
    assert_eq!(body["code"], "validation_error");
    assert_eq!(body["message"], "Field 'Name' in 'Products' item #2 is required");
}

#[tokio::test]
async fn honeypot_catches_bots_and_is_dropped_for_humans() {
    let (store, mailer, _) = setup(contact_schema("contact")).await;
    let app = test_router(Config::default(), store.clone(), test_dispatcher(mailer.clone(), store));

    let mut bot = valid_contact();
    bot["fr_hp"] = json!("http://spam.example");
    let (status, body) = read_json(app.clone().oneshot(json_request(SUBMIT, &bot)).await.unwrap()).await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "spam_detected");

    let mut human = valid_contact();
    human["fr_hp"] = json!("");
    let (status, _) = read_json(app.oneshot(json_request(SUBMIT, &human)).await.unwrap()).await;
    assert_eq!(status, 200);
    assert_eq!(mailer.sent().len(), 1);
}

#[tokio::test]
async fn unknown_form_and_bad_bodies() {
    let (store, mailer, _) = setup(contact_schema("contact")).await;
    let app = test_router(Config::default(), store.clone(), test_dispatcher(mailer, store));

    let (status, body) = read_json(
        app.clone()
            .oneshot(json_request("/formrelay/v1/forms/missing/submit", &valid_contact()))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 404);
    assert_eq!(body["code"], "form_not_found");
    assert_eq!(body["message"], "Form not found");

    let (status, body) =
        read_json(app.clone().oneshot(json_request(SUBMIT, &json!([1, 2]))).await.unwrap()).await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "invalid_data");

    let (status, body) =
        read_json(app.oneshot(json_request(SUBMIT, &json!({}))).await.unwrap()).await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "invalid_data");
}

#[tokio::test]
async fn too_many_fields() {
    let (store, mailer, _) = setup(contact_schema("contact")).await;
    let config = Config::from_toml("[limits]\nmax_fields = 3").unwrap();
    let app = test_router(config, store.clone(), test_dispatcher(mailer, store));

    let mut data = valid_contact();
    data["phone"] = json!("555");
    let (status, body) = read_json(app.oneshot(json_request(SUBMIT, &data)).await.unwrap()).await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "too_many_fields");
}

#[tokio::test]
async fn empty_honeypot_does_not_count_as_a_field() {
    let (store, mailer, _) = setup(contact_schema("contact")).await;
    let config = Config::from_toml("[limits]\nmax_fields = 3").unwrap();
    let app = test_router(config, store.clone(), test_dispatcher(mailer.clone(), store));

    let mut data = valid_contact();
    data["fr_hp"] = json!("");
    let (status, body) = read_json(app.oneshot(json_request(SUBMIT, &data)).await.unwrap()).await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(mailer.sent().len(), 1);
}

#[tokio::test]
async fn posted_form_uses_form_id_and_referer() {
    let mut schema = contact_schema("contact");
    schema.save_to_admin = true;
    let (store, mailer, id) = setup(schema).await;
    let app = test_router(Config::default(), store.clone(), test_dispatcher(mailer, store.clone()));

    let body = "form_id=contact&action=formrelay_submit&_http_referer=%2Fcontact-us\
                &name=Ann&email=ann%40example.com&message=Hello+there";
    let (status, reply) = read_json(app.oneshot(form_request("/submit", body)).await.unwrap()).await;
    assert_eq!(status, 200, "{reply}");

    let records = store.list_submissions(id).await.unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.page_url, "http://localhost:8080/contact-us");
    assert_eq!(record.data["message"], "Hello there");
    assert_eq!(record.data["Page URL"], "http://localhost:8080/contact-us");
    assert!(!record.data.contains_key("form_id"));
    assert_eq!(record.user_agent, "unknown");
}

#[tokio::test]
async fn posted_form_without_form_id() {
    let (store, mailer, _) = setup(contact_schema("contact")).await;
    let app = test_router(Config::default(), store.clone(), test_dispatcher(mailer, store));

    let (status, body) = read_json(
        app.oneshot(form_request("/submit", "name=Ann&email=ann%40example.com"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 404);
    assert_eq!(body["code"], "form_not_found");
}

fn resume_schema() -> FormSchema {
    let mut schema = contact_schema("contact");
    schema.fields.push(
        FieldDefinition::new(
            "resume",
            FieldKind::File(FileRules {
                allowed_extensions: vec!["pdf".into()],
                ..FileRules::default()
            }),
        )
        .with_label("Resume"),
    );
    schema
}

fn multipart_request(file_name: &str) -> Request<Body> {
    multipart_request_from("ann@example.com", file_name)
}

fn multipart_request_from(email: &str, file_name: &str) -> Request<Body> {
    let boundary = "formrelay-boundary";
    let mut body = String::new();
    for (name, value) in [("name", "Ann"), ("email", email), ("message", "CV attached")] {
        body.push_str(&format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    body.push_str(&format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"resume\"; filename=\"{file_name}\"\r\n\
         Content-Type: application/pdf\r\n\r\n%PDF-1.4 test\r\n--{boundary}--\r\n"
    ));
    Request::builder()
        .method("POST")
        .uri(SUBMIT)
        .header("content-type", format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(body))
        .unwrap()
}

fn upload_config(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.uploads.directory = dir.display().to_string();
    config.uploads.base_url = "https://cdn.example.com/uploads/".into();
    config
}

#[tokio::test]
async fn multipart_upload_is_stored_and_attached() {
    let dir = tempfile::tempdir().unwrap();
    let (store, mailer, _) = setup(resume_schema()).await;
    let app = test_router(upload_config(dir.path()), store.clone(), test_dispatcher(mailer.clone(), store));

    let (status, body) = read_json(app.oneshot(multipart_request("my cv.pdf")).await.unwrap()).await;
    assert_eq!(status, 200, "{body}");

    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    let attachment = &sent[0].attachments[0];
    assert_eq!(attachment.content_type, "application/pdf");
    assert_eq!(std::fs::read(&attachment.path).unwrap(), b"%PDF-1.4 test");
    assert!(attachment.path.starts_with(dir.path()));
    assert!(sent[0].html_body.contains("https://cdn.example.com/uploads/"));
}

#[tokio::test]
async fn multipart_upload_with_wrong_extension() {
    let dir = tempfile::tempdir().unwrap();
    let (store, mailer, _) = setup(resume_schema()).await;
    let app = test_router(upload_config(dir.path()), store.clone(), test_dispatcher(mailer.clone(), store));

    let (status, body) = read_json(app.oneshot(multipart_request("cv.exe")).await.unwrap()).await;
    assert_eq!(status, 400);
    assert_eq!(body["message"], "File type not allowed for field 'Resume'");
    assert!(mailer.sent().is_empty());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn multipart_upload_not_kept_when_validation_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (store, mailer, _) = setup(resume_schema()).await;
    let app = test_router(upload_config(dir.path()), store.clone(), test_dispatcher(mailer.clone(), store));

    let (status, body) = read_json(
        app.oneshot(multipart_request_from("not-an-email", "cv.pdf"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "validation_error");
    assert_eq!(body["message"], "Field 'Email' must contain a valid email address");
    assert!(mailer.sent().is_empty());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn list_forms_with_paging_headers() {
    let store = memory_store().await;
    for slug in ["alpha", "beta", "gamma"] {
        let mut schema = contact_schema(slug);
        schema.title = format!("{slug} form");
        store.save_form(&schema).await.unwrap();
    }
    let mailer = Arc::new(RecordingMailer::default());
    let app = test_router(Config::default(), store.clone(), test_dispatcher(mailer, store));

    let response = app
        .clone()
        .oneshot(get("/formrelay/v1/forms?per_page=2&page=2"))
        .await
        .unwrap();
    assert_eq!(response.headers()["x-total-count"], "3");
    assert_eq!(response.headers()["x-total-pages"], "2");
    let (status, body) = read_json(response).await;
    assert_eq!(status, 200);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["slug"], "gamma");
    assert_eq!(
        body[0]["submit_url"],
        "http://localhost:8080/formrelay/v1/forms/gamma/submit"
    );

    let (_, body) = read_json(
        app.oneshot(get("/formrelay/v1/forms?search=BET"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["title"], "beta form");
}

#[tokio::test]
async fn get_form_definition() {
    let (store, mailer, id) = setup(contact_schema("contact")).await;
    let app = test_router(Config::default(), store.clone(), test_dispatcher(mailer, store));

    let (status, body) = read_json(
        app.clone()
            .oneshot(get("/formrelay/v1/forms/contact"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["id"], id);
    assert_eq!(body["title"], "Contact");
    assert_eq!(body["fields"][1]["name"], "email");
    assert_eq!(body["fields"][1]["type"], "email");

    let (status, body) = read_json(
        app.clone()
            .oneshot(get("/formrelay/v1/forms/unknown"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 404);
    assert_eq!(body, json!({"message": "Form not found"}));

    let (status, body) = read_json(app.oneshot(get("/formrelay/v1/forms/%21%21")).await.unwrap()).await;
    assert_eq!(status, 400);
    assert_eq!(body, json!({"message": "Invalid slug"}));
}
