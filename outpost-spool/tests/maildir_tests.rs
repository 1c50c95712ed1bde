#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::{collections::VecDeque, time::Duration};

use async_trait::async_trait;
use outpost_common::{Transport, TransportError};
use outpost_spool::{DrainReport, Maildir, SpoolConfig, SpoolError, SpooledMessageId};

/// Records every send and answers from a script, accepting once it runs out
#[derive(Default)]
struct ScriptedTransport {
    replies: VecDeque<Result<(), TransportError>>,
    sent: Vec<(String, Vec<String>, Vec<u8>)>,
}

impl ScriptedTransport {
    fn replying(replies: impl IntoIterator<Item = Result<(), TransportError>>) -> Self {
        Self {
            replies: replies.into_iter().collect(),
            sent: Vec::new(),
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn send(&mut self, from: &str, to: &[String], message: &[u8]) -> Result<(), TransportError> {
        self.sent
            .push((from.to_string(), to.to_vec(), message.to_vec()));
        self.replies.pop_front().unwrap_or(Ok(()))
    }

    async fn close(&mut self) {}
}

fn recipients(to: &[&str]) -> Vec<String> {
    to.iter().map(ToString::to_string).collect()
}

fn rejected_files(maildir: &Maildir) -> Vec<String> {
    std::fs::read_dir(maildir.path().join("cur"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(".rejected-"))
        .collect()
}

#[tokio::test]
async fn test_enqueue_list_and_read() {
    let dir = tempfile::tempdir().unwrap();
    let maildir = Maildir::open(dir.path(), true).unwrap();

    let first = maildir
        .enqueue("foo@bar.com", &recipients(&["a@b.com"]), b"Subject: one\r\n\r\n1")
        .await
        .unwrap();
    let second = maildir
        .enqueue(
            "foo@bar.com",
            &recipients(&["c@d.com", "e@f.com"]),
            b"Subject: two\r\n\r\n2",
        )
        .await
        .unwrap();

    let listed = maildir.list().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.contains(&first));
    assert!(listed.contains(&second));

    let message = maildir.read(&second).await.unwrap();
    assert_eq!(message.from, "foo@bar.com");
    assert_eq!(message.to, recipients(&["c@d.com", "e@f.com"]));
    assert_eq!(&*message.data, b"Subject: two\r\n\r\n2");
    assert!(message.path.starts_with(maildir.incoming_dir()));

    // Nothing is left behind in tmp/
    assert_eq!(std::fs::read_dir(dir.path().join("tmp")).unwrap().count(), 0);
}

#[tokio::test]
async fn test_list_ignores_dot_files_and_includes_cur() {
    let dir = tempfile::tempdir().unwrap();
    let maildir = Maildir::open(dir.path(), true).unwrap();

    std::fs::write(dir.path().join("new/.hidden"), b"x").unwrap();
    std::fs::write(dir.path().join("cur/.rejected-old"), b"x").unwrap();
    std::fs::write(
        dir.path().join("cur/legacy"),
        b"X-Actually-From: a@b.c\r\nX-Actually-To: d@e.f\r\n\r\nbody",
    )
    .unwrap();

    let listed = maildir.list().await.unwrap();
    assert_eq!(listed, vec![SpooledMessageId::from_filename("legacy").unwrap()]);
}

#[tokio::test]
async fn test_read_missing_message() {
    let dir = tempfile::tempdir().unwrap();
    let maildir = Maildir::open(dir.path(), true).unwrap();
    let id = SpooledMessageId::generate();

    assert!(matches!(
        maildir.read(&id).await,
        Err(SpoolError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_enqueue_refuses_header_injection() {
    let dir = tempfile::tempdir().unwrap();
    let maildir = Maildir::open(dir.path(), true).unwrap();

    let result = maildir
        .enqueue(
            "legit@x.com",
            &recipients(&["victim@y.com\r\nX-Actually-From: forged@evil.com"]),
            b"Subject: hi\r\n\r\nbody",
        )
        .await;

    assert!(matches!(result, Err(SpoolError::InvalidEnvelope(_))));
    assert!(maildir.is_empty().await.unwrap());
    assert_eq!(std::fs::read_dir(dir.path().join("tmp")).unwrap().count(), 0);
}

#[tokio::test]
async fn test_quoted_recipient_with_comma_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let maildir = Maildir::open(dir.path(), true).unwrap();
    let to = recipients(&["\"Doe, Jane\"@example.com", "john@example.com"]);

    let id = maildir
        .enqueue("foo@bar.com", &to, b"Subject: hi\r\n\r\nbody")
        .await
        .unwrap();

    let message = maildir.read(&id).await.unwrap();
    assert_eq!(message.from, "foo@bar.com");
    assert_eq!(message.to, to);
}

#[tokio::test]
async fn test_drain_delivers_and_empties_spool() {
    let dir = tempfile::tempdir().unwrap();
    let maildir = Maildir::open(dir.path(), true).unwrap();

    for n in 0..2 {
        maildir
            .enqueue(
                "no-reply@nextthought.com",
                &recipients(&["user@example.com"]),
                format!("Subject: {n}\r\n\r\nbody").as_bytes(),
            )
            .await
            .unwrap();
    }

    let mut transport = ScriptedTransport::default();
    let report = maildir.drain(&mut transport).await.unwrap();

    assert_eq!(
        report,
        DrainReport {
            delivered: 2,
            ..DrainReport::default()
        }
    );
    assert_eq!(transport.sent.len(), 2);
    assert_eq!(transport.sent[0].0, "no-reply@nextthought.com");
    assert_eq!(transport.sent[0].1, recipients(&["user@example.com"]));
    assert!(transport.sent[0].2.starts_with(b"Subject: "));
    assert!(maildir.is_empty().await.unwrap());
    assert_eq!(std::fs::read_dir(dir.path().join("tmp")).unwrap().count(), 0);
}

#[tokio::test]
async fn test_permanent_failure_sets_message_aside() {
    let dir = tempfile::tempdir().unwrap();
    let maildir = Maildir::open(dir.path(), true).unwrap();
    let id = maildir
        .enqueue("a@b.com", &recipients(&["blacklisted@example.com"]), b"\r\nx")
        .await
        .unwrap();

    let mut transport = ScriptedTransport::replying([Err(TransportError::Permanent(
        "Address blacklisted".to_string(),
    ))]);
    let report = maildir.drain(&mut transport).await.unwrap();

    assert_eq!(report.rejected, 1);
    assert!(maildir.is_empty().await.unwrap());
    assert_eq!(rejected_files(&maildir), vec![format!(".rejected-{id}")]);

    // Rejected messages are never retried
    let report = maildir.drain(&mut transport).await.unwrap();
    assert_eq!(report, DrainReport::default());
    assert_eq!(transport.sent.len(), 1);
}

#[tokio::test]
async fn test_malformed_input_counts_as_permanent() {
    let dir = tempfile::tempdir().unwrap();
    let maildir = Maildir::open(dir.path(), true).unwrap();
    maildir
        .enqueue("a@b.com", &recipients(&["c@d.com"]), b"\r\nx")
        .await
        .unwrap();

    let mut transport =
        ScriptedTransport::replying([Err(TransportError::Malformed("bad from".to_string()))]);
    let report = maildir.drain(&mut transport).await.unwrap();

    assert_eq!(report.rejected, 1);
    assert_eq!(rejected_files(&maildir).len(), 1);
}

#[tokio::test]
async fn test_transient_failure_keeps_message() {
    let dir = tempfile::tempdir().unwrap();
    let maildir = Maildir::open(dir.path(), true).unwrap();
    let id = maildir
        .enqueue("a@b.com", &recipients(&["c@d.com"]), b"\r\nx")
        .await
        .unwrap();

    let mut transport =
        ScriptedTransport::replying([Err(TransportError::Transient("throttled".to_string()))]);
    let report = maildir.drain(&mut transport).await.unwrap();

    assert_eq!(report.deferred, 1);
    assert_eq!(maildir.list().await.unwrap(), vec![id]);

    // And the next drain picks it up again
    let report = maildir.drain(&mut transport).await.unwrap();
    assert_eq!(report.delivered, 1);
    assert!(maildir.is_empty().await.unwrap());
}

#[tokio::test]
async fn test_unreachable_transport_stops_drain() {
    let dir = tempfile::tempdir().unwrap();
    let maildir = Maildir::open(dir.path(), true).unwrap();
    for _ in 0..3 {
        maildir
            .enqueue("a@b.com", &recipients(&["c@d.com"]), b"\r\nx")
            .await
            .unwrap();
    }

    let mut transport = ScriptedTransport::replying([
        Ok(()),
        Err(TransportError::Unreachable("connection refused".to_string())),
    ]);
    let result = maildir.drain(&mut transport).await;

    assert!(matches!(
        result,
        Err(SpoolError::Transport(TransportError::Unreachable(_)))
    ));
    assert_eq!(transport.sent.len(), 2);
    assert_eq!(maildir.len().await.unwrap(), 2);
    assert_eq!(std::fs::read_dir(dir.path().join("tmp")).unwrap().count(), 0);
}

#[tokio::test]
async fn test_unreadable_spool_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let maildir = Maildir::open(dir.path(), true).unwrap();
    std::fs::write(dir.path().join("new/garbage"), b"Subject: no envelope\r\n\r\n").unwrap();

    let mut transport = ScriptedTransport::default();
    let report = maildir.drain(&mut transport).await.unwrap();

    assert_eq!(report.rejected, 1);
    assert!(transport.sent.is_empty());
    assert_eq!(rejected_files(&maildir), vec![".rejected-garbage".to_string()]);
}

#[tokio::test]
async fn test_locked_message_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let maildir = Maildir::open(dir.path(), true).unwrap();
    let id = maildir
        .enqueue("a@b.com", &recipients(&["c@d.com"]), b"\r\nx")
        .await
        .unwrap();
    std::fs::write(dir.path().join(format!("tmp/.sending-{id}")), b"").unwrap();

    let mut transport = ScriptedTransport::default();
    let report = maildir.drain(&mut transport).await.unwrap();

    assert_eq!(report.skipped, 1);
    assert!(transport.sent.is_empty());
    assert_eq!(maildir.len().await.unwrap(), 1);
}

#[tokio::test]
async fn test_stale_lock_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let maildir = Maildir::open(dir.path(), true)
        .unwrap()
        .with_config(SpoolConfig { stale_lock_secs: 0 });
    let id = maildir
        .enqueue("a@b.com", &recipients(&["c@d.com"]), b"\r\nx")
        .await
        .unwrap();
    std::fs::write(dir.path().join(format!("tmp/.sending-{id}")), b"").unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let mut transport = ScriptedTransport::default();
    let report = maildir.drain(&mut transport).await.unwrap();

    assert_eq!(report.delivered, 1);
    assert!(maildir.is_empty().await.unwrap());
    assert_eq!(std::fs::read_dir(dir.path().join("tmp")).unwrap().count(), 0);
}

#[test]
fn test_opened_path_is_absolute() {
    let dir = tempfile::tempdir().unwrap();
    let maildir = Maildir::open(dir.path(), true).unwrap();
    assert!(maildir.path().is_absolute());
}
