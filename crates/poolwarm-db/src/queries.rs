//! SQL issued against the server.

/// Resident pages in LRU order, most recently used first. Pages that do
/// not belong to a named index (undo, system, change buffer) are skipped.
pub const BUFFER_POOL_PAGES: &str = "SELECT TABLE_NAME, INDEX_NAME, SPACE, PAGE_NUMBER \
     FROM information_schema.INNODB_BUFFER_PAGE_LRU \
     WHERE TABLE_NAME IS NOT NULL AND INDEX_NAME IS NOT NULL \
     ORDER BY LRU_POSITION";

pub const SERVER_VERSION: &str = "SELECT VERSION()";

pub const INNODB_PAGE_SIZE: &str = "SELECT @@innodb_page_size";

pub const INNODB_STATUS: &str = "SHOW GLOBAL STATUS LIKE 'Innodb_%'";

pub const TABLE_STATS: &str = "SELECT TABLE_ROWS, DATA_LENGTH, INDEX_LENGTH \
     FROM information_schema.TABLES \
     WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?";

pub const INDEX_COLUMNS: &str = "SELECT COLUMN_NAME \
     FROM information_schema.STATISTICS \
     WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND INDEX_NAME = ? \
     ORDER BY SEQ_IN_INDEX";
