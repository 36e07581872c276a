//! Member-facing texts, keyboards and listing cards.

use marketboard_gateway_protocol::{ButtonStyle, InlineButton, InlineKeyboard, ListingCard};

use super::action::ButtonAction;
use crate::listing::{Category, Listing, ListingAction, ListingStatus, Transition};

/// Text that identifies the board message among the board channel's messages.
pub const BOARD_MARKER: &str = "FINAL HELL – MARKTPLATZ";

pub const REWARD_PROMPT: &str =
    "Möchtest du einen Preis oder Belohnung angeben? Antworte mit Betrag oder 'kein'.";
pub const VISIBILITY_PROMPT: &str = "Möchtest du anonym posten?";
pub const PERMISSION_DENIED: &str = "Keine Berechtigung";
pub const GENERIC_FAILURE: &str = "Das hat leider nicht geklappt. Bitte versuche es erneut.";

const ANONYMOUS_CREATOR: &str = "🕶️ Anonymer Auftraggeber";
const COLOUR_OPEN: u32 = 0xff0000;
const COLOUR_CLAIMED: u32 = 0xffa500;
const COLOUR_ARCHIVED: u32 = 0x808080;

/// Discord rejects embed descriptions longer than this.
const MAX_CARD_BODY: usize = 4096;
const MAX_CARD_DESCRIPTION: usize = 3000;
const MAX_CARD_REWARD: usize = 500;

// ============================================================================
// Board & workspace
// ============================================================================

pub fn board_message() -> String {
    format!("📜 **{}**\nWähle aus, was du erstellen möchtest:", BOARD_MARKER)
}

/// Create buttons, three per row.
pub fn board_keyboard() -> InlineKeyboard {
    let buttons: Vec<InlineButton> = Category::ALL
        .iter()
        .map(|c| {
            InlineButton::new(
                format!("{} {}", c.emoji(), c.label()),
                ButtonAction::Create(*c).callback_data(),
            )
        })
        .collect();

    InlineKeyboard {
        rows: buttons.chunks(3).map(<[InlineButton]>::to_vec).collect(),
    }
}

/// Channel name for a new workspace, e.g. `erstellung-anna-3`.
pub fn workspace_name(username: &str, seq: u64) -> String {
    let slug: String = username
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect();
    let slug = slug.trim_matches('-');
    let slug = if slug.is_empty() { "mitglied" } else { slug };
    format!("erstellung-{}-{}", slug, seq)
}

pub fn workspace_intro(category: Category) -> String {
    format!(
        "📜 **{} ERSTELLEN**\nSchreibe hier dein Anliegen.",
        category.label().to_uppercase()
    )
}

pub fn workspace_created(workspace_id: &str) -> String {
    format!("Privater Channel erstellt: <#{}>", workspace_id)
}

pub fn visibility_keyboard() -> InlineKeyboard {
    InlineKeyboard::single_row(vec![
        InlineButton::new(
            "👤 Öffentlich posten",
            ButtonAction::Visibility { anonymous: false }.callback_data(),
        ),
        InlineButton::new(
            "🕶️ Anonym posten",
            ButtonAction::Visibility { anonymous: true }.callback_data(),
        )
        .with_style(ButtonStyle::Secondary),
    ])
}

pub fn mention(member_id: &str) -> String {
    format!("<@{}>", member_id)
}

// ============================================================================
// Listing cards
// ============================================================================

/// Card for a live listing, with the buttons valid in its status.
pub fn listing_card(listing: &Listing) -> ListingCard {
    let (status, colour) = match &listing.status {
        ListingStatus::Open { interested } if interested.is_empty() => {
            ("🟢 Offen".to_string(), COLOUR_OPEN)
        }
        ListingStatus::Open { interested } => (
            format!("🟢 Offen · 🔔 {} Interessent(en)", interested.len()),
            COLOUR_OPEN,
        ),
        ListingStatus::Claimed { by } => {
            (format!("🟡 Angenommen von {}", mention(by)), COLOUR_CLAIMED)
        }
        ListingStatus::Closed => ("🔒 Abgeschlossen".to_string(), COLOUR_ARCHIVED),
    };

    ListingCard {
        title: listing.category.label().to_uppercase(),
        description: card_body(listing, &status),
        colour,
        footer: Some(format!("ID: {}", listing.id)),
        inline_keyboard: listing_keyboard(listing),
    }
}

/// Card posted to the archive channel after a listing closed.
pub fn archive_card(listing: &Listing, action: ListingAction) -> ListingCard {
    let status = match action {
        ListingAction::Withdraw => "❌ Zurückgezogen",
        _ => "🔒 Abgeschlossen",
    };

    ListingCard {
        title: listing.category.label().to_uppercase(),
        description: card_body(listing, status),
        colour: COLOUR_ARCHIVED,
        footer: Some(format!("ID: {}", listing.id)),
        inline_keyboard: None,
    }
}

fn card_body(listing: &Listing, status: &str) -> String {
    let creator = if listing.anonymous {
        ANONYMOUS_CREATOR.to_string()
    } else {
        mention(&listing.creator_id)
    };

    let body = format!(
        "**Beschreibung:** {}\n\n**Belohnung:** {}\n\n**Erstellt von:** {}\n\n**Status:** {}",
        truncate_chars(&listing.description, MAX_CARD_DESCRIPTION),
        truncate_chars(listing.reward.as_display(), MAX_CARD_REWARD),
        creator,
        status
    );
    // Room for the ellipsis.
    truncate_chars(&body, MAX_CARD_BODY - 1)
}

fn listing_keyboard(listing: &Listing) -> Option<InlineKeyboard> {
    let button = |text: &str, action: ListingAction, style: ButtonStyle| {
        InlineButton::new(
            text,
            ButtonAction::Listing {
                action,
                id: listing.id.clone(),
            }
            .callback_data(),
        )
        .with_style(style)
    };

    let close = button("🔒 Abschließen", ListingAction::Close, ButtonStyle::Secondary);
    match listing.status {
        ListingStatus::Open { .. } => Some(InlineKeyboard::single_row(vec![
            button("✅ Annehmen", ListingAction::Accept, ButtonStyle::Success),
            button("🔔 Interesse zeigen", ListingAction::Interest, ButtonStyle::Primary),
            button("❌ Zurückziehen", ListingAction::Withdraw, ButtonStyle::Danger),
            close,
        ])),
        ListingStatus::Claimed { .. } => Some(InlineKeyboard::single_row(vec![close])),
        ListingStatus::Closed => None,
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

// ============================================================================
// Replies & audit log
// ============================================================================

/// Ephemeral confirmation for the member who triggered a transition.
pub fn action_confirmation(transition: &Transition) -> &'static str {
    match transition.action {
        ListingAction::Accept => "Du hast das Angebot angenommen.",
        ListingAction::Interest if transition.changed => "Dein Interesse wurde vermerkt.",
        ListingAction::Interest => "Du hast bereits Interesse gezeigt.",
        ListingAction::Withdraw => "Dein Angebot wurde zurückgezogen.",
        ListingAction::Close => "Das Angebot wurde abgeschlossen.",
    }
}

pub fn log_published(listing: &Listing) -> String {
    format!(
        "{} hat einen Auftrag erstellt: {} (Anonym: {})",
        mention(&listing.creator_id),
        listing.category.label(),
        listing.anonymous
    )
}

pub fn log_transition(transition: &Transition) -> String {
    let verb = match transition.action {
        ListingAction::Accept => "hat angenommen",
        ListingAction::Interest => "zeigt Interesse an",
        ListingAction::Withdraw => "hat zurückgezogen",
        ListingAction::Close => "hat abgeschlossen",
    };
    format!(
        "{} {}: {} `{}`",
        mention(&transition.actor),
        verb,
        transition.listing.category.label(),
        transition.listing.id
    )
}
