//! End-to-end marketplace flows through the handler with a recording platform.

mod common;

use std::sync::Arc;

use marketboard::dispatch::MarketHandler;
use marketboard::dispatch::render::{
    BOARD_MARKER, GENERIC_FAILURE, PERMISSION_DENIED, REWARD_PROMPT, VISIBILITY_PROMPT,
};
use marketboard::gateway::{ListingCard, MessageHandler};
use marketboard::listing::{ListingError, ListingId, ListingPolicy, ListingStatus, Reward};
use marketboard::session::SessionState;

use common::{
    ARCHIVE, Call, LOGS, MARKET, MISSIONS, RecordingPlatform, button, market, outsider, player,
    text,
};

const GW: &str = "discord";

// ============================================================================
// Helpers
// ============================================================================

/// Press a create button and return the new workspace id.
async fn open_workspace(handler: &MarketHandler, member: &str, data: &str) -> String {
    let reply = handler
        .handle_button(GW, &button(MARKET, &player(member), data))
        .await
        .expect("create button answers");
    reply
        .strip_prefix("Privater Channel erstellt: <#")
        .and_then(|r| r.strip_suffix('>'))
        .expect("reply links the workspace")
        .to_string()
}

/// Run the creation flow and return the listing id from the posted card.
async fn publish_listing(
    handler: &MarketHandler,
    platform: &RecordingPlatform,
    member: &str,
    create: &str,
    description: &str,
    reward: &str,
    visibility: &str,
) -> ListingId {
    let ws = open_workspace(handler, member, create).await;
    handler.handle_message(GW, &text(&ws, &player(member), description));
    handler.handle_message(GW, &text(&ws, &player(member), reward));
    let answer = handler
        .handle_button(GW, &button(&ws, &player(member), visibility))
        .await;
    assert_eq!(answer, None);

    let card = last_post(platform);
    listing_id(&card)
}

fn last_post(platform: &RecordingPlatform) -> ListingCard {
    platform
        .calls()
        .into_iter()
        .rev()
        .find_map(|call| match call {
            Call::PostListing { card, .. } => Some(card),
            _ => None,
        })
        .expect("a listing was posted")
}

fn listing_id(card: &ListingCard) -> ListingId {
    let footer = card.footer.as_deref().expect("card has a footer");
    ListingId::from(footer.strip_prefix("ID: ").expect("footer carries the id"))
}

async fn press(handler: &MarketHandler, member: &str, data: String) -> Option<String> {
    handler
        .handle_button(GW, &button(MARKET, &player(member), &data))
        .await
}

// ============================================================================
// Board
// ============================================================================

#[tokio::test]
async fn ready_ensures_board_in_market_channel() {
    let (handler, platform) = market(ListingPolicy::default());

    handler.handle_ready(GW).await;

    let calls = platform.calls();
    assert_eq!(calls.len(), 1);
    match &calls[0] {
        Call::EnsureBoard {
            chat_id,
            marker,
            content,
            inline_keyboard,
        } => {
            assert_eq!(chat_id, MARKET);
            assert_eq!(marker, BOARD_MARKER);
            assert!(content.contains(BOARD_MARKER));
            assert_eq!(inline_keyboard.callback_data().count(), 6);
        }
        other => panic!("unexpected call: {:?}", other),
    }
}

// ============================================================================
// Creation flow
// ============================================================================

#[tokio::test]
async fn job_offer_round_trip() {
    let (handler, platform) = market(ListingPolicy::default());

    let ws = open_workspace(&handler, "A", "create_job-offer").await;
    assert!(handler.sessions().contains(&ws));
    assert_eq!(
        platform.calls()[0],
        Call::CreateWorkspace {
            owner_id: "A".to_string(),
            name: "erstellung-usera-1".to_string(),
        }
    );
    assert_eq!(
        platform.messages_to(&ws),
        vec!["📜 **AUFTRAG ERSTELLEN**\nSchreibe hier dein Anliegen.".to_string()]
    );

    let reply = handler
        .handle_message(GW, &text(&ws, &player("A"), "Escort needed"))
        .unwrap();
    assert_eq!(reply.content, REWARD_PROMPT);

    let reply = handler
        .handle_message(GW, &text(&ws, &player("A"), "none"))
        .unwrap();
    assert_eq!(reply.content, VISIBILITY_PROMPT);
    let keyboard = reply.inline_keyboard.unwrap();
    let data: Vec<&str> = keyboard.callback_data().collect();
    assert_eq!(data, vec!["visibility_public", "visibility_anonymous"]);

    let answer = handler
        .handle_button(GW, &button(&ws, &player("A"), "visibility_public"))
        .await;
    assert_eq!(answer, None);

    let posts = platform.posts_to(MISSIONS);
    assert_eq!(posts.len(), 1);
    assert!(posts[0].description.contains("Escort needed"));
    assert!(posts[0].description.contains("<@A>"));

    let id = listing_id(&posts[0]);
    let listing = handler.listings().get(&id).unwrap();
    assert_eq!(listing.creator_id, "A");
    assert_eq!(listing.description, "Escort needed");
    assert_eq!(listing.reward, Reward::None);
    assert!(!listing.anonymous);
    assert!(listing.status.is_open());
    assert!(listing.post.is_some());

    assert!(!handler.sessions().contains(&ws));
    assert_eq!(platform.deleted_workspaces(), vec![ws]);
    assert_eq!(
        platform.messages_to(LOGS),
        vec!["<@A> hat einen Auftrag erstellt: Auftrag (Anonym: false)".to_string()]
    );
}

#[tokio::test]
async fn anonymous_sale_offer_with_kein() {
    let (handler, platform) = market(ListingPolicy::default());

    let id = publish_listing(
        &handler,
        &platform,
        "A",
        "create_verkauf",
        "10 crates",
        "kein",
        "visibility_anonymous",
    )
    .await;

    let listing = handler.listings().get(&id).unwrap();
    assert!(listing.reward.is_none());
    assert!(listing.anonymous);

    let card = &platform.posts_to(MARKET)[0];
    assert_eq!(card.title, "VERKAUF");
    assert!(card.description.contains("**Belohnung:** Keine"));
    assert!(!card.description.contains("<@A>"));
    assert!(handler.sessions().is_empty());
    assert_eq!(platform.deleted_workspaces().len(), 1);
}

#[tokio::test]
async fn fields_fill_in_order_and_never_regress() {
    let (handler, _platform) = market(ListingPolicy::default());
    let ws = open_workspace(&handler, "A", "create_help-request").await;

    assert!(
        handler
            .handle_message(GW, &text(&ws, &player("A"), "   "))
            .is_none()
    );
    handler.handle_message(GW, &text(&ws, &player("A"), "first"));
    handler.handle_message(GW, &text(&ws, &player("A"), "50 gold"));
    assert!(
        handler
            .handle_message(GW, &text(&ws, &player("A"), "third"))
            .is_none()
    );

    let session = handler.sessions().get(&ws).unwrap();
    assert_eq!(
        session.state,
        SessionState::AwaitingVisibility {
            description: "first".to_string(),
            reward: Reward::Offered("50 gold".to_string()),
        }
    );
}

#[tokio::test]
async fn messages_outside_workspaces_and_from_bots_are_ignored() {
    let (handler, _platform) = market(ListingPolicy::default());
    let ws = open_workspace(&handler, "A", "create_seeking").await;

    assert!(
        handler
            .handle_message(GW, &text(MARKET, &player("A"), "hello"))
            .is_none()
    );

    let mut bot = player("bot");
    bot.is_bot = true;
    assert!(handler.handle_message(GW, &text(&ws, &bot, "echo")).is_none());
    assert_eq!(
        handler.sessions().get(&ws).unwrap().state,
        SessionState::AwaitingDescription
    );
}

#[tokio::test]
async fn double_visibility_press_publishes_once() {
    let (handler, platform) = market(ListingPolicy::default());
    let ws = open_workspace(&handler, "A", "create_offering").await;
    handler.handle_message(GW, &text(&ws, &player("A"), "Mining laser"));
    handler.handle_message(GW, &text(&ws, &player("A"), "5000"));

    let public = button(&ws, &player("A"), "visibility_public");
    let anonymous = button(&ws, &player("A"), "visibility_anonymous");
    let (first, second) = tokio::join!(
        handler.handle_button(GW, &public),
        handler.handle_button(GW, &anonymous)
    );

    assert_eq!(first, None);
    assert_eq!(second, None);
    assert_eq!(platform.posts_to(MARKET).len(), 1);
    assert_eq!(handler.listings().len(), 1);
    assert_eq!(platform.deleted_workspaces().len(), 1);
}

#[tokio::test]
async fn stale_visibility_button_is_a_no_op() {
    let (handler, platform) = market(ListingPolicy::default());

    let answer = handler
        .handle_button(GW, &button("ws-unknown", &player("A"), "visibility_public"))
        .await;

    assert_eq!(answer, None);
    assert!(platform.calls().is_empty());
}

#[tokio::test]
async fn failed_workspace_creation_leaves_no_session() {
    let (handler, platform) = market(ListingPolicy::default());
    platform.fail_create(true);

    let answer = handler
        .handle_button(GW, &button(MARKET, &player("A"), "create_purchase-request"))
        .await;

    assert_eq!(answer.as_deref(), Some(GENERIC_FAILURE));
    assert!(handler.sessions().is_empty());
}

#[tokio::test]
async fn failed_post_keeps_session_for_retry() {
    let (handler, platform) = market(ListingPolicy::default());
    let ws = open_workspace(&handler, "A", "create_sale-offer").await;
    handler.handle_message(GW, &text(&ws, &player("A"), "Ship parts"));
    handler.handle_message(GW, &text(&ws, &player("A"), "keine"));

    platform.fail_post(true);
    let answer = handler
        .handle_button(GW, &button(&ws, &player("A"), "visibility_public"))
        .await;
    assert_eq!(answer.as_deref(), Some(GENERIC_FAILURE));
    assert!(handler.listings().is_empty());
    assert!(matches!(
        handler.sessions().get(&ws).unwrap().state,
        SessionState::AwaitingVisibility { .. }
    ));
    assert!(platform.deleted_workspaces().is_empty());

    platform.fail_post(false);
    let answer = handler
        .handle_button(GW, &button(&ws, &player("A"), "visibility_public"))
        .await;
    assert_eq!(answer, None);
    assert_eq!(handler.listings().len(), 1);
    assert!(!handler.sessions().contains(&ws));
}

#[tokio::test]
async fn deleted_workspace_drops_session() {
    let (handler, _platform) = market(ListingPolicy::default());
    let ws = open_workspace(&handler, "A", "create_job-offer").await;

    handler.handle_chat_deleted(GW, &ws);

    assert!(!handler.sessions().contains(&ws));
    assert!(
        handler
            .handle_message(GW, &text(&ws, &player("A"), "late"))
            .is_none()
    );
}

#[tokio::test]
async fn expiry_removes_old_sessions_and_their_workspaces() {
    let (handler, platform) = market(ListingPolicy::default());
    let ws = open_workspace(&handler, "A", "create_job-offer").await;

    assert_eq!(handler.expire_sessions(chrono::Duration::hours(1)).await, 0);
    assert!(handler.sessions().contains(&ws));

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(
        handler
            .expire_sessions(chrono::Duration::milliseconds(5))
            .await,
        1
    );
    assert!(handler.sessions().is_empty());
    assert_eq!(platform.deleted_workspaces(), vec![ws]);
}

// ============================================================================
// Role gating
// ============================================================================

#[tokio::test]
async fn members_without_role_are_denied() {
    let (handler, platform) = market(ListingPolicy::default());

    let answer = handler
        .handle_button(GW, &button(MARKET, &outsider("X"), "create_job-offer"))
        .await;
    assert_eq!(answer.as_deref(), Some(PERMISSION_DENIED));
    assert!(platform.calls().is_empty());

    let id = publish_listing(
        &handler,
        &platform,
        "A",
        "create_sale-offer",
        "Ore",
        "none",
        "visibility_public",
    )
    .await;
    let answer = handler
        .handle_button(GW, &button(MARKET, &outsider("X"), &format!("accept_{}", id)))
        .await;
    assert_eq!(answer.as_deref(), Some(PERMISSION_DENIED));
    assert!(handler.listings().get(&id).unwrap().status.is_open());
}

#[tokio::test]
async fn admin_role_may_create() {
    let (handler, _platform) = market(ListingPolicy::default());
    let mut admin = outsider("Z");
    admin.roles.push(common::ADMIN_ROLE.to_string());

    let answer = handler
        .handle_button(GW, &button(MARKET, &admin, "create_hilfe"))
        .await;

    assert!(answer.unwrap().starts_with("Privater Channel erstellt"));
    assert_eq!(handler.sessions().len(), 1);
}

#[tokio::test]
async fn unknown_buttons_are_ignored() {
    let (handler, platform) = market(ListingPolicy::default());
    assert_eq!(press(&handler, "A", "launch_rockets".to_string()).await, None);
    assert_eq!(press(&handler, "A", "create_nothing".to_string()).await, None);
    assert!(platform.calls().is_empty());
}

// ============================================================================
// Listing actions
// ============================================================================

async fn open_listing() -> (MarketHandler, Arc<RecordingPlatform>, ListingId) {
    let (handler, platform) = market(ListingPolicy::default());
    let id = publish_listing(
        &handler,
        &platform,
        "A",
        "create_sale-offer",
        "10 crates",
        "200",
        "visibility_public",
    )
    .await;
    (handler, platform, id)
}

#[tokio::test]
async fn accept_claims_and_blocks_interest() {
    let (handler, platform, id) = open_listing().await;

    let answer = press(&handler, "B", format!("accept_{}", id)).await;
    assert_eq!(answer.as_deref(), Some("Du hast das Angebot angenommen."));

    let listing = handler.listings().get(&id).unwrap();
    assert_eq!(listing.status.claimed_by(), Some("B"));

    let post = listing.post.unwrap();
    let edits = platform.edits_of(&post.message_id);
    assert_eq!(edits.len(), 1);
    assert!(edits[0].description.contains("Angenommen von <@B>"));
    assert!(
        platform
            .messages_to(LOGS)
            .last()
            .unwrap()
            .starts_with("<@B> hat angenommen")
    );

    let answer = press(&handler, "C", format!("interest_{}", id)).await;
    assert_eq!(
        answer.as_deref(),
        Some(ListingError::NotOpen(id.clone()).user_message())
    );
}

#[tokio::test]
async fn interest_is_idempotent() {
    let (handler, platform, id) = open_listing().await;

    press(&handler, "C", format!("interest_{}", id)).await;
    let again = press(&handler, "C", format!("interest_{}", id)).await;
    assert_eq!(again.as_deref(), Some("Du hast bereits Interesse gezeigt."));

    let listing = handler.listings().get(&id).unwrap();
    assert_eq!(listing.status.interested().collect::<Vec<_>>(), vec!["C"]);

    let post = listing.post.unwrap();
    assert_eq!(platform.edits_of(&post.message_id).len(), 1);
}

#[tokio::test]
async fn creator_withdraw_archives_listing() {
    let (handler, platform, id) = open_listing().await;
    let post = handler.listings().get(&id).unwrap().post.unwrap();

    let answer = press(&handler, "A", format!("withdraw_{}", id)).await;
    assert_eq!(answer.as_deref(), Some("Dein Angebot wurde zurückgezogen."));
    assert!(!handler.listings().contains(&id));

    assert!(platform.calls().contains(&Call::DeleteMessage {
        chat_id: post.chat_id.clone(),
        message_id: post.message_id.clone(),
    }));
    let archived = platform.posts_to(ARCHIVE);
    assert_eq!(archived.len(), 1);
    assert!(archived[0].description.contains("Zurückgezogen"));
    assert!(archived[0].inline_keyboard.is_none());

    let answer = press(&handler, "B", format!("accept_{}", id)).await;
    assert_eq!(
        answer.as_deref(),
        Some(ListingError::NotFound(id.clone()).user_message())
    );
}

#[tokio::test]
async fn non_creator_cannot_withdraw() {
    let (handler, _platform, id) = open_listing().await;

    let answer = press(&handler, "B", format!("withdraw_{}", id)).await;

    assert_eq!(
        answer.as_deref(),
        Some("Nur der Ersteller kann ein offenes Angebot zurückziehen.")
    );
    assert!(handler.listings().get(&id).unwrap().status.is_open());
}

#[tokio::test]
async fn creator_cannot_withdraw_claimed_listing() {
    let (handler, platform, id) = open_listing().await;
    press(&handler, "B", format!("accept_{}", id)).await;

    let answer = press(&handler, "A", format!("withdraw_{}", id)).await;

    assert_eq!(
        answer.as_deref(),
        Some("Nur der Ersteller kann ein offenes Angebot zurückziehen.")
    );
    let listing = handler.listings().get(&id).unwrap();
    assert_eq!(listing.status.claimed_by(), Some("B"));
    assert!(platform.posts_to(ARCHIVE).is_empty());
}

#[tokio::test]
async fn claimant_can_close() {
    let (handler, platform, id) = open_listing().await;
    press(&handler, "B", format!("accept_{}", id)).await;

    let denied = press(&handler, "C", format!("close_{}", id)).await;
    assert!(denied.unwrap().starts_with("Nur der Ersteller"));

    let answer = press(&handler, "B", format!("close_{}", id)).await;
    assert_eq!(answer.as_deref(), Some("Das Angebot wurde abgeschlossen."));
    assert!(handler.listings().is_empty());

    let archived = platform.posts_to(ARCHIVE);
    assert_eq!(archived.len(), 1);
    assert!(archived[0].description.contains("Abgeschlossen"));
}

#[tokio::test]
async fn self_accept_follows_policy() {
    let (handler, _platform, id) = open_listing().await;
    assert!(press(&handler, "A", format!("accept_{}", id)).await.is_some());
    assert_eq!(
        handler.listings().get(&id).unwrap().status,
        ListingStatus::Claimed {
            by: "A".to_string()
        }
    );

    let (handler, platform) = market(ListingPolicy {
        allow_self_accept: false,
    });
    let id = publish_listing(
        &handler,
        &platform,
        "A",
        "create_job-offer",
        "Escort",
        "none",
        "visibility_public",
    )
    .await;
    let answer = press(&handler, "A", format!("accept_{}", id)).await;
    assert_eq!(
        answer.as_deref(),
        Some(ListingError::SelfAcceptDenied(id.clone()).user_message())
    );
    assert!(handler.listings().get(&id).unwrap().status.is_open());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_actions_have_one_winner() {
    let (handler, platform, id) = open_listing().await;
    let handler = Arc::new(handler);

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..8 {
        let handler = handler.clone();
        let data = if i == 0 {
            format!("withdraw_{}", id)
        } else {
            format!("accept_{}", id)
        };
        let member = if i == 0 { "A".to_string() } else { format!("B{}", i) };
        tasks.spawn(async move { press(&handler, &member, data).await });
    }

    let mut winners = 0;
    while let Some(answer) = tasks.join_next().await {
        let answer = answer.unwrap().unwrap();
        if answer == "Du hast das Angebot angenommen."
            || answer == "Dein Angebot wurde zurückgezogen."
        {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);

    let archived = platform.posts_to(ARCHIVE).len();
    let live = handler.listings().len();
    assert_eq!(archived + live, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn withdraw_and_close_race_archives_once() {
    for _ in 0..20 {
        let (handler, platform, id) = open_listing().await;
        press(&handler, "C", format!("interest_{}", id)).await;
        let handler = Arc::new(handler);

        let mut tasks = tokio::task::JoinSet::new();
        for action in ["withdraw", "close"] {
            let handler = handler.clone();
            let data = format!("{}_{}", action, id);
            tasks.spawn(async move { press(&handler, "A", data).await });
        }

        let mut answers = Vec::new();
        while let Some(answer) = tasks.join_next().await {
            answers.push(answer.unwrap().unwrap());
        }
        let winners = answers
            .iter()
            .filter(|a| {
                *a == "Dein Angebot wurde zurückgezogen." || *a == "Das Angebot wurde abgeschlossen."
            })
            .count();
        assert_eq!(winners, 1);
        assert!(
            answers
                .iter()
                .any(|a| a == ListingError::NotFound(id.clone()).user_message())
        );

        assert!(handler.listings().is_empty());
        assert_eq!(platform.posts_to(ARCHIVE).len(), 1);
    }
}
