//! Compile-time capacities and fixed parameters of the shadow layer.

/// Largest accepted/rejected/delta payload handled; larger ones are dropped.
pub const SHADOW_RX_BUF_LEN: usize = 512;
/// Requests that can wait for an acknowledgement at the same time.
pub const MAX_ACKS_IN_FLIGHT: usize = 10;
/// Distinct thing/action pairs that can hold accepted/rejected subscriptions.
pub const MAX_THINGS_IN_FLIGHT: usize = 10;
/// Subscription records, one per accepted and one per rejected topic.
pub const MAX_SUBSCRIPTION_RECORDS: usize = 2 * MAX_THINGS_IN_FLIGHT;
/// Token budget for one inbound document.
pub const MAX_JSON_TOKENS: usize = 120;
/// Delta fields that can be registered. Shares the token budget.
pub const MAX_DELTA_FIELDS: usize = MAX_JSON_TOKENS;
/// Longest MQTT client id, which is also the client token prefix.
pub const MAX_CLIENT_ID_LEN: usize = 80;
/// Longest thing name.
pub const MAX_THING_NAME_LEN: usize = 30;
/// Longest client token: the client id, a dash and a sequence number.
pub const MAX_CLIENT_TOKEN_LEN: usize = MAX_CLIENT_ID_LEN + 10;
/// Longest shadow topic, `things/<thing>/shadow/delete/accepted` included.
pub const MAX_SHADOW_TOPIC_LEN: usize = 64;
/// Capacity of string and raw-object field values.
pub const MAX_FIELD_STR_LEN: usize = 64;
/// Size of a get or delete request body.
pub const REQUEST_BODY_LEN: usize = MAX_CLIENT_TOKEN_LEN + 20;

/// Packet timeout the shadow session configures on its client.
pub const PACKET_TIMEOUT_MS: u32 = 5_000;
/// Command timeout the shadow session configures on its client.
pub const COMMAND_TIMEOUT_MS: u32 = 20_000;
/// Keep-alive used by [`Shadow::connect`](super::Shadow::connect).
pub const KEEP_ALIVE_SECONDS: u16 = 600;
/// Wait after subscribing an accepted/rejected pair before publishing.
pub const SUBSCRIBE_SETTLING_TIME_MS: u32 = 2_000;
