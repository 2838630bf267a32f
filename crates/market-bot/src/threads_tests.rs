#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use crate::gateway::mock::{ChannelFate, MockGateway};
    use crate::threads::{OrderPlacedRequest, ThreadError, ThreadOrchestrator};

    fn order() -> serde_json::Value {
        json!({"order_id": "abc12345-6789"})
    }

    fn orchestrator(gateway: MockGateway) -> (ThreadOrchestrator<Arc<MockGateway>>, Arc<MockGateway>) {
        let gateway = Arc::new(gateway);
        (ThreadOrchestrator::new(Arc::clone(&gateway)), gateway)
    }

    // ── create_thread ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn create_thread_happy_path() {
        let (orch, gateway) = orchestrator(MockGateway::happy());

        let creation = orch
            .create_thread(1, 2, &[3, 4], &order())
            .await
            .unwrap();

        assert_eq!(creation.thread_id, "555");
        assert!(creation.failed.is_empty());
        assert!(creation.invite_code.is_none(), "no invite when everyone enrolled");

        let calls = gateway.calls();
        assert!(calls.contains(&"fetch_guild:1".to_string()));
        assert!(calls.contains(&"join_thread:555".to_string()));
        assert!(calls.contains(&"add_member:555:3".to_string()));
        assert!(calls.contains(&"add_member:555:4".to_string()));
    }

    #[tokio::test]
    async fn create_thread_names_orders_with_order_prefix() {
        let (orch, gateway) = orchestrator(MockGateway::happy());
        orch.create_thread(1, 2, &[3], &order()).await.unwrap();
        assert!(
            gateway.calls().contains(&"create_thread:2:order-abc12345".to_string()),
            "order id must be truncated to 8 chars: {:?}",
            gateway.calls()
        );
    }

    #[tokio::test]
    async fn create_thread_names_offers_with_offer_prefix() {
        let (orch, gateway) = orchestrator(MockGateway::happy());
        orch.create_thread(1, 2, &[3], &json!({"id": "feedbeef-rest"}))
            .await
            .unwrap();
        assert!(gateway.calls().contains(&"create_thread:2:offer-feedbeef".to_string()));
    }

    #[tokio::test]
    async fn create_thread_missing_parameters() {
        let (orch, gateway) = orchestrator(MockGateway::happy());

        let err = orch.create_thread(0, 2, &[3], &order()).await.unwrap_err();
        assert_eq!(err, ThreadError::MissingParameters);

        let err = orch.create_thread(1, 2, &[], &order()).await.unwrap_err();
        assert_eq!(err, ThreadError::MissingParameters);

        assert!(gateway.calls().is_empty(), "validation must precede Discord calls");
    }

    #[tokio::test]
    async fn create_thread_guild_unavailable() {
        let (orch, _) = orchestrator(MockGateway::happy().without_guilds());
        let err = orch.create_thread(1, 2, &[3], &order()).await.unwrap_err();
        assert_eq!(err, ThreadError::GuildUnavailable);
        assert_eq!(err.to_string(), "Bot is not in the configured guild");
    }

    #[tokio::test]
    async fn create_thread_channel_error_mapping() {
        for (fate, expected) in [
            (ChannelFate::Missing, ThreadError::ChannelMissing),
            (ChannelFate::Forbidden, ThreadError::NoViewPermission),
            (ChannelFate::Invalid, ThreadError::InvalidChannelData),
        ] {
            let (orch, _) = orchestrator(MockGateway::happy().channel_fate(2, fate));
            let err = orch.create_thread(1, 2, &[3], &order()).await.unwrap_err();
            assert_eq!(err, expected);
        }
    }

    #[tokio::test]
    async fn create_thread_no_create_permission() {
        let (orch, _) = orchestrator(MockGateway::happy().failing_thread_create());
        let err = orch.create_thread(1, 2, &[3], &order()).await.unwrap_err();
        assert_eq!(err, ThreadError::NoCreateThreadPermission);
    }

    #[tokio::test]
    async fn create_thread_partial_enrollment_failure_mints_capped_invite() {
        let (orch, gateway) = orchestrator(MockGateway::happy().failing_member(4));

        let creation = orch
            .create_thread(1, 2, &[3, 4], &order())
            .await
            .unwrap();

        assert_eq!(creation.failed_ids(), vec![4]);
        assert_eq!(creation.failed[0].reason, "permission denied");
        assert!(creation.invite_code.is_some());

        let invites = gateway.invites();
        assert_eq!(invites.len(), 1);
        assert_eq!(invites[0].max_uses, 1, "invite capped to failure count");
        assert!(invites[0].unique);

        let dms = gateway.dms();
        assert_eq!(dms.len(), 1);
        assert_eq!(dms[0].0, 4);
        assert!(dms[0].1.contains(&format!("https://discord.gg/{}", creation.invite_code.unwrap())));
    }

    #[tokio::test]
    async fn create_thread_all_members_fail() {
        let (orch, gateway) =
            orchestrator(MockGateway::happy().failing_member(3).failing_member(4));

        let creation = orch
            .create_thread(1, 2, &[3, 4], &order())
            .await
            .unwrap();

        assert_eq!(creation.failed.len(), 2);
        assert_eq!(gateway.invites()[0].max_uses, 2);
        assert_eq!(gateway.dms().len(), 2);
    }

    #[tokio::test]
    async fn create_thread_invite_creation_failure_still_reports_members() {
        let (orch, gateway) =
            orchestrator(MockGateway::happy().failing_member(4).failing_invites());

        let creation = orch
            .create_thread(1, 2, &[3, 4], &order())
            .await
            .unwrap();

        assert_eq!(creation.failed_ids(), vec![4]);
        assert!(creation.invite_code.is_none());
        assert!(gateway.dms().is_empty(), "no DM without an invite to link");
    }

    #[tokio::test]
    async fn create_thread_dm_failure_is_best_effort() {
        let (orch, gateway) = orchestrator(
            MockGateway::happy()
                .failing_member(3)
                .failing_member(4)
                .failing_dm(3),
        );

        let creation = orch
            .create_thread(1, 2, &[3, 4], &order())
            .await
            .unwrap();

        assert!(creation.invite_code.is_some());
        // Member 3's DM failed but member 4 still got theirs.
        assert_eq!(gateway.dms().len(), 1);
        assert_eq!(gateway.dms()[0].0, 4);
    }

    #[tokio::test]
    async fn create_thread_skips_zero_member_ids() {
        let (orch, gateway) = orchestrator(MockGateway::happy());
        let creation = orch.create_thread(1, 2, &[3, 0], &order()).await.unwrap();
        assert!(creation.failed.is_empty());
        assert!(!gateway.calls().contains(&"add_member:555:0".to_string()));
    }

    // ── verify_invite ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn verify_invite_skips_existing_member() {
        let (orch, gateway) = orchestrator(MockGateway::happy().with_member(1, 9));
        let invite = orch.verify_invite(Some(9), 1, 2, None).await;
        assert!(invite.is_none());
        assert!(!gateway
            .calls()
            .iter()
            .any(|c| c.starts_with("create_invite")));
    }

    #[tokio::test]
    async fn verify_invite_reuses_live_code() {
        let (orch, _) = orchestrator(MockGateway::happy().with_live_invite("keep-me"));
        let invite = orch.verify_invite(Some(9), 1, 2, Some("keep-me")).await;
        assert_eq!(invite.as_deref(), Some("keep-me"));
    }

    #[tokio::test]
    async fn verify_invite_mints_nonunique_replacement_for_dead_code() {
        let (orch, gateway) = orchestrator(MockGateway::happy());
        let invite = orch.verify_invite(Some(9), 1, 2, Some("stale")).await;
        assert!(invite.is_some());

        let invites = gateway.invites();
        assert_eq!(invites.len(), 1);
        assert_eq!(invites[0].max_uses, 0, "customer invite is not use-capped");
        assert!(!invites[0].unique);
    }

    #[tokio::test]
    async fn verify_invite_returns_none_on_resolution_failure() {
        let (orch, _) = orchestrator(MockGateway::happy().without_guilds());
        assert!(orch.verify_invite(Some(9), 1, 2, None).await.is_none());

        let (orch, _) = orchestrator(MockGateway::happy().channel_fate(2, ChannelFate::Missing));
        assert!(orch.verify_invite(Some(9), 1, 2, None).await.is_none());

        let (orch, _) = orchestrator(MockGateway::happy().failing_invites());
        assert!(orch.verify_invite(Some(9), 1, 2, None).await.is_none());
    }

    // ── order_placed ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn order_placed_success_carries_thread_and_customer_invite() {
        let (orch, _) = orchestrator(MockGateway::happy());
        let outcome = orch
            .order_placed(OrderPlacedRequest {
                server_id: 1,
                channel_id: 2,
                members: vec![3, 4],
                order: order(),
                customer_discord_id: Some(9),
                invite_code: None,
            })
            .await;

        assert_eq!(outcome.thread_id.as_deref(), Some("555"));
        assert!(outcome.error.is_none());
        assert!(outcome.failed_members.is_empty());
        assert!(outcome.invite_code.is_some(), "customer is not a member, invite minted");
    }

    #[tokio::test]
    async fn order_placed_failure_reports_reason() {
        let (orch, _) = orchestrator(MockGateway::happy().without_guilds());
        let outcome = orch
            .order_placed(OrderPlacedRequest {
                server_id: 1,
                channel_id: 2,
                members: vec![3],
                order: order(),
                customer_discord_id: None,
                invite_code: None,
            })
            .await;

        assert!(outcome.thread_id.is_none());
        assert_eq!(
            outcome.error.as_deref(),
            Some("Bot is not in the configured guild")
        );
    }

    #[tokio::test]
    async fn order_placed_redelivery_is_idempotent_safe() {
        // Redelivering the same request twice must not fail; a duplicate
        // thread may be created but each attempt reports success.
        let (orch, gateway) = orchestrator(MockGateway::happy());
        let request = OrderPlacedRequest {
            server_id: 1,
            channel_id: 2,
            members: vec![3],
            order: order(),
            customer_discord_id: None,
            invite_code: None,
        };

        let first = orch.order_placed(request.clone()).await;
        let second = orch.order_placed(request).await;

        assert!(first.error.is_none());
        assert!(second.error.is_none());
        let thread_creates = gateway
            .calls()
            .iter()
            .filter(|c| c.starts_with("create_thread"))
            .count();
        assert_eq!(thread_creates, 2);
    }
}
