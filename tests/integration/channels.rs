use crate::utils::{contact_schema, memory_store};
use chrono::{Local, TimeZone};
use formrelay::channels::email::EmailChannel;
use formrelay::channels::sheets::SheetsChannel;
use formrelay::channels::smtp::SmtpMailer;
use formrelay::channels::storage::AdminStorageChannel;
use formrelay::channels::telegram::TelegramChannel;
use formrelay::config::{SheetsConfig, SmtpConfig, TelegramConfig};
use formrelay::error::ChannelError;
use formrelay::pipeline::deliver::DeliveryChannel;
use formrelay::pipeline::{RequestMeta, Submission};
use formrelay::schema::FormSchema;
use serde_json::json;
use std::sync::Arc;
use test_utils::{HttpServer, SmtpServer};

fn submission(schema: FormSchema) -> Submission {
    Submission {
        schema: Arc::new(schema),
        data: json!({
            "name": "Ann <Lee>",
            "email": "ann@example.com",
            "message": "Hello there"
        })
        .as_object()
        .cloned()
        .unwrap(),
        meta: RequestMeta {
            ip: "198.51.100.7".into(),
            user_agent: "Mozilla/5.0".into(),
            referer: None,
        },
        page_url: "https://example.com/contact".into(),
        attachments: Vec::new(),
        received_at: Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap(),
    }
}

fn telegram_schema(chat_ids: &str) -> FormSchema {
    let mut schema = contact_schema("contact");
    schema.telegram.enabled = true;
    schema.telegram.bot_token = "123:abc".into();
    schema.telegram.chat_ids = chat_ids.into();
    schema
}

fn telegram(server: &HttpServer) -> TelegramChannel {
    TelegramChannel::new(&TelegramConfig {
        api_base: format!("{}/", server.base_url()),
        timeout_secs: 5,
    })
    .unwrap()
}

#[tokio::test]
async fn telegram_posts_html_message_to_every_chat() {
    let server = HttpServer::start(|_| (200, json!({"ok": true, "result": {}}))).await;
    let channel = telegram(&server);

    channel
        .deliver(&submission(telegram_schema("100, 200")))
        .await
        .unwrap();

    let requests = server.received();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].path, "/bot123:abc/sendMessage");
    let form = requests[0].form();
    assert_eq!(form["chat_id"], "100");
    assert_eq!(form["parse_mode"], "HTML");
    assert!(form["text"].contains("Ann &lt;Lee&gt;"));
    assert_eq!(requests[1].form()["chat_id"], "200");
}

#[tokio::test]
async fn telegram_succeeds_if_one_chat_accepts() {
    let server = HttpServer::start(|req| {
        if req.form().get("chat_id").map(String::as_str) == Some("404") {
            (400, json!({"ok": false, "description": "Bad Request: chat not found"}))
        } else {
            (200, json!({"ok": true}))
        }
    })
    .await;
    let channel = telegram(&server);

    channel
        .deliver(&submission(telegram_schema("404,100")))
        .await
        .unwrap();

    let err = channel
        .deliver(&submission(telegram_schema("404")))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "telegram_send_error");
    assert_eq!(
        err.to_string(),
        "Failed to send to any Telegram chat: Chat 404: Telegram API error: Bad Request: chat not found"
    );
}

#[tokio::test]
async fn telegram_uses_custom_template() {
    let server = HttpServer::start(|_| (200, json!({"ok": true}))).await;
    let channel = telegram(&server);
    let mut schema = telegram_schema("100");
    schema.telegram.template = Some("New lead from {name}".into());

    channel.deliver(&submission(schema)).await.unwrap();
    assert_eq!(server.received()[0].form()["text"], "New lead from Ann &lt;Lee&gt;");
}

#[tokio::test]
async fn telegram_without_chats_is_a_config_error() {
    let server = HttpServer::start(|_| (200, json!({"ok": true}))).await;
    let err = telegram(&server)
        .deliver(&submission(telegram_schema(" , ")))
        .await
        .unwrap_err();
    assert_eq!(err, ChannelError::TelegramConfig);
    assert!(server.received().is_empty());
}

fn sheets_schema() -> FormSchema {
    let mut schema = contact_schema("contact");
    schema.sheets.enabled = true;
    schema.sheets.spreadsheet_id = "sheet-1".into();
    schema.sheets.sheet_name = Some("Leads".into());
    schema
}

fn sheets_config(server: &HttpServer) -> SheetsConfig {
    SheetsConfig {
        client_id: Some("client".into()),
        client_secret: Some("secret".into()),
        refresh_token: Some("refresh".into()),
        token_url: format!("{}/token", server.base_url()),
        api_base: server.base_url(),
        timeout_secs: 5,
    }
}

#[tokio::test]
async fn sheets_appends_row_with_fresh_token() {
    let server = HttpServer::start(|req| {
        if req.path == "/token" {
            (200, json!({"access_token": "ya29.token", "expires_in": 3599}))
        } else {
            (200, json!({"updates": {"updatedRows": 1}}))
        }
    })
    .await;
    let channel = SheetsChannel::new(&sheets_config(&server)).unwrap();

    channel.deliver(&submission(sheets_schema())).await.unwrap();

    let requests = server.received();
    assert_eq!(requests.len(), 2);
    let token = requests[0].form();
    assert_eq!(token["grant_type"], "refresh_token");
    assert_eq!(token["refresh_token"], "refresh");

    let append = &requests[1];
    assert_eq!(
        append.path,
        "/v4/spreadsheets/sheet-1/values/Leads!A:Z:append"
    );
    assert_eq!(append.query.as_deref(), Some("valueInputOption=USER_ENTERED"));
    assert_eq!(append.headers["authorization"], "Bearer ya29.token");
    assert_eq!(
        append.json(),
        json!({"values": [[
            "2024-03-05 14:07:09",
            "Contact",
            "Ann <Lee>",
            "ann@example.com",
            "Hello there"
        ]]})
    );
}

#[tokio::test]
async fn sheets_reports_api_errors() {
    let server = HttpServer::start(|req| {
        if req.path == "/token" {
            (200, json!({"access_token": "ya29.token"}))
        } else {
            (403, json!({"error": {"code": 403, "message": "The caller does not have permission"}}))
        }
    })
    .await;
    let channel = SheetsChannel::new(&sheets_config(&server)).unwrap();

    let err = channel.deliver(&submission(sheets_schema())).await.unwrap_err();
    assert_eq!(err.code(), "sheets_api_error");
    assert_eq!(
        err.to_string(),
        "Google Sheets API error: The caller does not have permission"
    );
}

#[tokio::test]
async fn sheets_token_failure() {
    let server = HttpServer::start(|_| {
        (400, json!({"error": "invalid_grant", "error_description": "Token has been expired or revoked."}))
    })
    .await;
    let channel = SheetsChannel::new(&sheets_config(&server)).unwrap();

    let err = channel.deliver(&submission(sheets_schema())).await.unwrap_err();
    assert_eq!(err.code(), "sheets_auth_error");
    assert_eq!(
        err.to_string(),
        "Failed to get access token: Token has been expired or revoked."
    );
    assert_eq!(server.received().len(), 1);
}

#[tokio::test]
async fn sheets_without_credentials() {
    let server = HttpServer::start(|_| (200, json!({}))).await;
    let channel = SheetsChannel::new(&SheetsConfig {
        refresh_token: Some("  ".into()),
        ..sheets_config(&server)
    })
    .unwrap();

    let err = channel.deliver(&submission(sheets_schema())).await.unwrap_err();
    assert_eq!(
        err,
        ChannelError::SheetsAuth("Google Sheets authentication not configured".into())
    );
    assert!(server.received().is_empty());
}

fn mailer(server: &SmtpServer) -> EmailChannel {
    EmailChannel::new(Arc::new(SmtpMailer::new(&SmtpConfig {
        address: server.addr.to_string(),
        from: "forms@example.com".into(),
        helo_name: "relay.test".into(),
        timeout_secs: 5,
    })))
}

#[tokio::test]
async fn email_relays_to_recipients_and_bcc() {
    let server = SmtpServer::start().await;
    let mut schema = contact_schema("contact");
    schema.email.recipients = "team@example.com, sales@example.com".into();
    schema.email.bcc = Some("archive@example.com".into());
    schema.email.subject = "New message".into();

    mailer(&server).deliver(&submission(schema)).await.unwrap();

    let mails = server.received();
    assert_eq!(mails.len(), 1);
    let mail = &mails[0];
    assert_eq!(mail.from, "forms@example.com");
    assert_eq!(
        mail.recipients,
        vec!["team@example.com", "sales@example.com", "archive@example.com"]
    );
    assert!(mail.data.contains("Subject: New message\r\n"));
    assert!(mail.data.contains("To: <team@example.com>, <sales@example.com>\r\n"));
    assert!(!mail.data.contains("archive@example.com"));
    assert!(mail.data.contains("Content-Type: text/html; charset=UTF-8"));
}

#[tokio::test]
async fn email_rejected_by_relay() {
    let server = SmtpServer::start_rejecting().await;
    let err = mailer(&server)
        .deliver(&submission(contact_schema("contact")))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "email_send_error");
    assert_eq!(err.to_string(), "Failed to send email");
    assert!(server.received().is_empty());
}

#[tokio::test]
async fn email_with_invalid_recipient_never_connects() {
    let server = SmtpServer::start().await;
    let mut schema = contact_schema("contact");
    schema.email.recipients = "team@example.com, not-an-address".into();

    let err = mailer(&server).deliver(&submission(schema)).await.unwrap_err();
    assert_eq!(err, ChannelError::InvalidEmail("not-an-address".into()));
    assert!(server.received().is_empty());
}

#[tokio::test]
async fn admin_storage_keeps_a_record() {
    let store = memory_store().await;
    let id = store.save_form(&contact_schema("contact")).await.unwrap();
    let mut schema = contact_schema("contact");
    schema.id = id;
    schema.save_to_admin = true;

    AdminStorageChannel::new(store.clone())
        .deliver(&submission(schema))
        .await
        .unwrap();

    let records = store.list_submissions(id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].title, "Contact - Ann <Lee> - 05.03.2024 14:07:09");
    assert_eq!(records[0].submitted_at, "2024-03-05 14:07:09");
    assert_eq!(records[0].ip, "198.51.100.7");
    assert_eq!(records[0].page_url, "https://example.com/contact");
}
