mod common;

use common::*;
use serde_json::json;
use work_tree::prelude::*;

#[derive(Debug, Clone)]
struct Notify {
    user_id: &'static str,
    send_email: bool,
    send_sms: bool,
    send_push: bool,
}

fn channel(
    name: &str,
    kind: &'static str,
    enabled: fn(&Notify) -> bool,
    skips: &Trace,
) -> Step<Notify> {
    let skips = skips.clone();
    Step::new(name, move |_ctx: Context<Notify>| async move {
        Ok(json!({ "type": kind, "sent": true }))
    })
    .should_run(move |ctx: &Context<Notify>| enabled(ctx.data()))
    .on_skipped(move |ctx: &Context<Notify>| {
        skips.push(format!("{}:{}", kind, ctx.data().user_id));
        Ok(())
    })
}

fn notifications(skips: &Trace) -> Tree<Notify> {
    Tree::new("notifications")
        .serial(Step::new("fetchUserPreferences", |_ctx: Context<Notify>| async {
            Ok(json!({
                "email": "user@example.com",
                "phone": "+1234567890",
                "deviceToken": "abc123",
            }))
        }))
        .unwrap()
        .serial(channel("sendEmailNotification", "email", |n| n.send_email, skips))
        .unwrap()
        .serial(channel("sendSmsNotification", "sms", |n| n.send_sms, skips))
        .unwrap()
        .serial(channel("sendPushNotification", "push", |n| n.send_push, skips))
        .unwrap()
        .serial(Step::new("logNotifications", |ctx: Context<Notify>| async move {
            let sent: Vec<&str> = [
                ("sendEmailNotification", "email"),
                ("sendSmsNotification", "sms"),
                ("sendPushNotification", "push"),
            ]
            .into_iter()
            .filter(|(step, _)| ctx.result(step).is_some())
            .map(|(_, kind)| kind)
            .collect();
            Ok(json!({ "notificationsSent": sent }))
        }))
        .unwrap()
}

#[tokio::test]
async fn test_email_only_notifications() {
    let skips = Trace::new();
    let tree = notifications(&skips);

    let result = tree
        .run(Notify {
            user_id: "user-1",
            send_email: true,
            send_sms: false,
            send_push: false,
        })
        .await;

    assert!(result.is_completed());
    assert_eq!(
        result.result("logNotifications"),
        Some(&json!({ "notificationsSent": ["email"] }))
    );
    assert!(result.get("sendSmsNotification").unwrap().is_skipped());
    assert!(result.get("sendPushNotification").unwrap().is_skipped());
    assert_eq!(skips.entries(), vec!["sms:user-1", "push:user-1"]);
}

#[tokio::test]
async fn test_all_and_no_notifications() {
    let skips = Trace::new();
    let tree = notifications(&skips);

    let all = tree
        .run(Notify {
            user_id: "user-2",
            send_email: true,
            send_sms: true,
            send_push: true,
        })
        .await;
    assert_eq!(
        all.result("logNotifications"),
        Some(&json!({ "notificationsSent": ["email", "sms", "push"] }))
    );
    assert!(skips.entries().is_empty());

    let none = tree
        .run(Notify {
            user_id: "user-3",
            send_email: false,
            send_sms: false,
            send_push: false,
        })
        .await;
    assert_eq!(
        none.result("logNotifications"),
        Some(&json!({ "notificationsSent": [] }))
    );
    assert_eq!(skips.entries().len(), 3);
}

#[tokio::test]
async fn test_maintenance_mode() {
    let executed = Calls::new();
    let tree = Tree::new("maintenanceMode")
        .should_run(|ctx: &Context<bool>| !*ctx.data())
        .serial(counted_step("processRequest", &executed, json!({ "processed": true })))
        .unwrap();

    assert!(tree.is_skipped(true).await);
    assert!(!tree.is_skipped(false).await);

    let down = tree.run(true).await;
    assert_eq!(down.status, WorkflowStatus::Completed);
    assert_eq!(down.get("maintenanceMode").unwrap().status, WorkStatus::Skipped);
    assert_eq!(executed.count(), 0);

    let up = tree.run(false).await;
    assert!(up.is_completed());
    assert_eq!(up.result("processRequest"), Some(&json!({ "processed": true })));
    assert_eq!(executed.count(), 1);
}
