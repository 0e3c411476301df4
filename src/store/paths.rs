//! Canonical ledger paths.
//!
//! Keeping every path constructor in one place means an engine can never
//! drift from the tree layout the others expect.

pub const USERS: &str = "users";
pub const WALLETS: &str = "wallets";
pub const INVESTMENTS: &str = "investments";
pub const CONTEST: &str = "popularity_contest";
pub const CHALLENGES: &str = "rps_challenges";
pub const SPIN_STATE: &str = "user_spin_state";
pub const GAMBLE_SESSIONS: &str = "gamble_sessions";
pub const ACTIVITY_LOG: &str = "activity_log";
pub const LIVE_FEED: &str = "live_feed";
pub const INVESTMENT_LOG: &str = "investment_log";
pub const POINTS_HISTORY: &str = "points_history";
pub const USER_MESSAGES: &str = "user_messages";
pub const BANNED_USERS: &str = "banned_users";
pub const CANDIDATES: &str = "candidates";
pub const DAILY_LIMITS: &str = "user_daily_limits";
pub const SITE_SETTINGS: &str = "site_settings";

pub fn crawler(name: &str) -> String {
    format!("{USERS}/{name}")
}

pub fn crawler_points(name: &str) -> String {
    format!("{USERS}/{name}/points")
}

pub fn crawler_likes(name: &str) -> String {
    format!("{USERS}/{name}/likes")
}

pub fn crawler_multiplier(name: &str) -> String {
    format!("{USERS}/{name}/stock_multiplier")
}

pub fn wallet(uid: &str) -> String {
    format!("{WALLETS}/{uid}")
}

pub fn wallet_cc(uid: &str) -> String {
    format!("{WALLETS}/{uid}/cc")
}

pub fn wallet_sp(uid: &str) -> String {
    format!("{WALLETS}/{uid}/sp")
}

pub fn position(uid: &str, crawler: &str) -> String {
    format!("{INVESTMENTS}/{uid}/{crawler}")
}

pub fn position_lots(uid: &str, crawler: &str) -> String {
    format!("{INVESTMENTS}/{uid}/{crawler}/lots")
}

pub fn lot(uid: &str, crawler: &str, lot_id: &str) -> String {
    format!("{INVESTMENTS}/{uid}/{crawler}/lots/{lot_id}")
}

pub fn personal_multiplier(uid: &str, crawler: &str) -> String {
    format!("{INVESTMENTS}/{uid}/{crawler}/personal_multiplier")
}

pub fn manual_override(uid: &str, crawler: &str) -> String {
    format!("{INVESTMENTS}/{uid}/{crawler}/manual_override")
}

pub fn investor_positions(uid: &str) -> String {
    format!("{INVESTMENTS}/{uid}")
}

pub fn challenge(id: &str) -> String {
    format!("{CHALLENGES}/{id}")
}

pub fn spin_state(uid: &str) -> String {
    format!("{SPIN_STATE}/{uid}")
}

pub fn spin_field(uid: &str, field: &str) -> String {
    format!("{SPIN_STATE}/{uid}/{field}")
}

pub fn gamble_session(uid: &str) -> String {
    format!("{GAMBLE_SESSIONS}/{uid}")
}

pub fn points_history(name: &str) -> String {
    format!("{POINTS_HISTORY}/{name}")
}

pub fn user_messages(uid: &str) -> String {
    format!("{USER_MESSAGES}/{uid}")
}

pub fn banned_user(uid: &str) -> String {
    format!("{BANNED_USERS}/{uid}")
}

pub fn candidate(name: &str) -> String {
    format!("{CANDIDATES}/{name}")
}

pub fn daily_limit(uid: &str, product_id: &str) -> String {
    format!("{DAILY_LIMITS}/{uid}/{product_id}")
}

pub fn settings(section: &str) -> String {
    format!("{SITE_SETTINGS}/{section}")
}
