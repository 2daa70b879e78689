/// Raw vocabulary token (a category label from the source).
/// Examples: `alpha`, `frost_archer`, `name_042`
pub type Token = String;
/// Dense integer id assigned to a token in first-seen vocabulary order.
pub type TokenId = u32;
/// External record identifier retained out-of-band for the result join.
/// Example: `8412`
pub type RecordKey = String;
/// Store-relative artifact path.
/// Example: `run_2026-08-04/train/TOPIC_TRY.csv`
pub type LogicalPath = String;
/// Destination table name used by the result publisher.
/// Example: `TOPIC_TRY`
pub type TableName = String;
/// Pipeline version tag stamped into result rows.
/// Examples: `v13`, `2026-08-04.1`
pub type VersionTag = String;
