//! Minimal SMTP client
//!
//! Speaks plain SMTP to a local relay: EHLO, MAIL, RCPT, DATA, QUIT. The
//! whole session runs under one timeout.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use nom::{
    IResult,
    branch::alt,
    bytes::complete::take_till,
    character::complete::{char, digit1, line_ending},
    combinator::{map_res, opt},
    sequence::tuple,
};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use super::email::{MailError, Mailer, OutgoingEmail};
use crate::config::SmtpConfig;

const LINE_WIDTH: usize = 76;

/// One line of a server reply
#[derive(Debug, PartialEq, Eq)]
pub struct ReplyLine<'a> {
    pub code: u16,
    /// `250-` continues, `250 ` ends the reply
    pub last: bool,
    pub text: &'a str,
}

/// Parse a reply line such as `250-SIZE 1000` or `354 go ahead`.
pub fn parse_reply_line(input: &str) -> IResult<&str, ReplyLine<'_>> {
    let parse_code = map_res(digit1, |d: &str| d.parse::<u16>());
    let (input, (code, sep, text)) = tuple((
        parse_code,
        opt(alt((char('-'), char(' ')))),
        take_till(|c| c == '\r' || c == '\n'),
    ))(input)?;
    let (input, _) = opt(line_ending)(input)?;
    Ok((
        input,
        ReplyLine {
            code,
            last: sep != Some('-'),
            text,
        },
    ))
}

/// Complete server reply, possibly multiline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub text: String,
}

pub struct SmtpMailer {
    address: String,
    from: String,
    helo_name: String,
    timeout: Duration,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Self {
        Self {
            address: config.address.clone(),
            from: config.from.clone(),
            helo_name: config.helo_name.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    async fn session(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        let stream = TcpStream::connect(&self.address).await?;
        let (read, mut write) = stream.into_split();
        let mut reader = BufReader::new(read);

        expect(&mut reader, "CONNECT", &[220]).await?;

        write_line(&mut write, &format!("EHLO {}", self.helo_name)).await?;
        match expect(&mut reader, "EHLO", &[250]).await {
            Ok(_) => {}
            Err(MailError::Rejected { .. }) => {
                write_line(&mut write, &format!("HELO {}", self.helo_name)).await?;
                expect(&mut reader, "HELO", &[250]).await?;
            }
            Err(e) => return Err(e),
        }

        write_line(&mut write, &format!("MAIL FROM:<{}>", self.from)).await?;
        expect(&mut reader, "MAIL", &[250]).await?;

        for rcpt in email.to.iter().chain(email.bcc.iter()) {
            write_line(&mut write, &format!("RCPT TO:<{rcpt}>")).await?;
            expect(&mut reader, "RCPT", &[250, 251]).await?;
        }

        write_line(&mut write, "DATA").await?;
        expect(&mut reader, "DATA", &[354]).await?;

        let message = build_message(&self.from, &self.helo_name, email).await?;
        write.write_all(dot_stuff(&message).as_bytes()).await?;
        write.write_all(b".\r\n").await?;
        write.flush().await?;
        expect(&mut reader, "DATA", &[250]).await?;

        write_line(&mut write, "QUIT").await?;
        // the relay may drop the connection without answering QUIT
        let _ = read_reply(&mut reader).await;
        Ok(())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    #[tracing::instrument(skip_all, fields(relay = %self.address, recipients = email.to.len()))]
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        tokio::time::timeout(self.timeout, self.session(email))
            .await
            .map_err(|_| MailError::Timeout)?
    }
}

async fn write_line<W: AsyncWriteExt + Unpin>(w: &mut W, line: &str) -> Result<(), MailError> {
    w.write_all(line.as_bytes()).await?;
    w.write_all(b"\r\n").await?;
    w.flush().await?;
    Ok(())
}

async fn read_reply<R: AsyncBufReadExt + Unpin>(r: &mut R) -> Result<Reply, MailError> {
    let mut text = Vec::new();
    loop {
        let mut line = String::new();
        if r.read_line(&mut line).await? == 0 {
            return Err(MailError::Protocol("connection closed".into()));
        }
        let (_, parsed) = parse_reply_line(&line)
            .map_err(|_| MailError::Protocol(format!("malformed reply: {}", line.trim_end())))?;
        text.push(parsed.text.to_string());
        if parsed.last {
            return Ok(Reply {
                code: parsed.code,
                text: text.join(" "),
            });
        }
    }
}

async fn expect<R: AsyncBufReadExt + Unpin>(
    r: &mut R,
    command: &'static str,
    codes: &[u16],
) -> Result<Reply, MailError> {
    let reply = read_reply(r).await?;
    if codes.contains(&reply.code) {
        Ok(reply)
    } else {
        Err(MailError::Rejected {
            command,
            code: reply.code,
            text: reply.text,
        })
    }
}

fn wrap_base64(bytes: &[u8]) -> String {
    let encoded = STANDARD.encode(bytes);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / LINE_WIDTH * 2 + 2);
    for chunk in encoded.as_bytes().chunks(LINE_WIDTH) {
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push_str("\r\n");
    }
    out
}

/// RFC 2047 encoded-word for non-ASCII header text
fn encode_header(text: &str) -> String {
    if text.is_ascii() {
        text.to_string()
    } else {
        format!("=?UTF-8?B?{}?=", STANDARD.encode(text.as_bytes()))
    }
}

fn quote_file_name(name: &str) -> String {
    name.replace(['"', '\\', '\r', '\n'], "_")
}

/// Render the RFC 5322 message. Bcc never appears in the headers.
async fn build_message(
    from: &str,
    helo_name: &str,
    email: &OutgoingEmail,
) -> Result<String, MailError> {
    let mut msg = String::new();
    msg.push_str(&format!("From: <{from}>\r\n"));
    let to: Vec<String> = email.to.iter().map(|a| format!("<{a}>")).collect();
    msg.push_str(&format!("To: {}\r\n", to.join(", ")));
    msg.push_str(&format!("Subject: {}\r\n", encode_header(&email.subject)));
    msg.push_str(&format!("Date: {}\r\n", chrono::Local::now().to_rfc2822()));
    msg.push_str(&format!("Message-ID: <{}@{helo_name}>\r\n", uuid::Uuid::new_v4()));
    msg.push_str("MIME-Version: 1.0\r\n");

    let html_part = format!(
        "Content-Type: text/html; charset=UTF-8\r\n\
         Content-Transfer-Encoding: base64\r\n\r\n{}",
        wrap_base64(email.html_body.as_bytes())
    );

    if email.attachments.is_empty() {
        msg.push_str(&html_part);
        return Ok(msg);
    }

    let boundary = format!("formrelay-{}", uuid::Uuid::new_v4().simple());
    msg.push_str(&format!(
        "Content-Type: multipart/mixed; boundary=\"{boundary}\"\r\n\r\n"
    ));
    msg.push_str(&format!("--{boundary}\r\n{html_part}"));
    for attachment in &email.attachments {
        let bytes = tokio::fs::read(&attachment.path).await?;
        let name = quote_file_name(&attachment.file_name);
        msg.push_str(&format!(
            "--{boundary}\r\n\
             Content-Type: {}; name=\"{name}\"\r\n\
             Content-Disposition: attachment; filename=\"{name}\"\r\n\
             Content-Transfer-Encoding: base64\r\n\r\n{}",
            attachment.content_type,
            wrap_base64(&bytes)
        ));
    }
    msg.push_str(&format!("--{boundary}--\r\n"));
    Ok(msg)
}

/// Escape lines starting with a dot for the DATA phase
fn dot_stuff(message: &str) -> String {
    let mut out = String::with_capacity(message.len() + 16);
    for line in message.split_inclusive("\r\n") {
        if line.starts_with('.') {
            out.push('.');
        }
        out.push_str(line);
    }
    if !out.ends_with("\r\n") {
        out.push_str("\r\n");
    }
    out
}
