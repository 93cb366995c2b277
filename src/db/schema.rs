//! Idempotent schema creation.
//!
//! Every statement is CREATE TABLE IF NOT EXISTS, so re-running init on an
//! existing schema is a no-op. Foreign keys cascade on delete and update:
//! deleting a row from blocks removes the full dependent closure.

use super::backend::Backend;

pub fn statements(backend: Backend) -> Vec<String> {
    let hash = backend.hash_type();
    let key = backend.key_type();
    let blob = backend.blob_type();
    let int = backend.int_type();
    let big = backend.bigint_type();
    let float = backend.float_type();

    let mut ddl = vec![
        format!(
            "CREATE TABLE IF NOT EXISTS blocks ( \
             hash {hash} NOT NULL, \
             data {blob} NOT NULL, \
             PRIMARY KEY (hash))"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS blockchain ( \
             height {big} NOT NULL, \
             hash {hash} NOT NULL UNIQUE, \
             utctimestamp {big} NOT NULL, \
             PRIMARY KEY (height), \
             FOREIGN KEY (hash) REFERENCES blocks (hash) \
             ON DELETE CASCADE ON UPDATE CASCADE)"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS block_meta ( \
             hash {hash} NOT NULL, \
             prevHash {hash} NOT NULL, \
             baseReward {big} NOT NULL, \
             difficulty {big} NOT NULL, \
             majorVersion {int} NOT NULL, \
             minorVersion {int} NOT NULL, \
             nonce {big} NOT NULL, \
             size {big} NOT NULL, \
             alreadyGeneratedCoins {big} NOT NULL, \
             alreadyGeneratedTransactions {big} NOT NULL, \
             reward {big} NOT NULL, \
             sizeMedian {big} NOT NULL, \
             totalFeeAmount {big} NOT NULL, \
             transactionsCumulativeSize {big} NOT NULL, \
             transactionsCount {big} NOT NULL, \
             orphan {int} NOT NULL, \
             penalty {float} NOT NULL, \
             PRIMARY KEY (hash), \
             FOREIGN KEY (hash) REFERENCES blocks (hash) \
             ON DELETE CASCADE ON UPDATE CASCADE)"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS transactions ( \
             hash {hash} NOT NULL, \
             block_hash {hash} NOT NULL, \
             coinbase {int} NOT NULL, \
             data {blob} NOT NULL, \
             PRIMARY KEY (hash), \
             FOREIGN KEY (block_hash) REFERENCES blocks (hash) \
             ON DELETE CASCADE ON UPDATE CASCADE)"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS transaction_meta ( \
             hash {hash} NOT NULL, \
             fee {big} NOT NULL, \
             amount {big} NOT NULL, \
             size {big} NOT NULL, \
             PRIMARY KEY (hash), \
             FOREIGN KEY (hash) REFERENCES transactions (hash) \
             ON DELETE CASCADE ON UPDATE CASCADE)"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS transaction_inputs ( \
             hash {hash} NOT NULL, \
             keyImage {hash} NOT NULL, \
             PRIMARY KEY (keyImage), \
             FOREIGN KEY (hash) REFERENCES transactions (hash) \
             ON DELETE CASCADE ON UPDATE CASCADE)"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS transaction_outputs ( \
             hash {hash} NOT NULL, \
             idx {big} NOT NULL, \
             amount {big} NOT NULL, \
             outputKey {hash} NOT NULL, \
             globalIdx {big}, \
             PRIMARY KEY (hash, idx), \
             FOREIGN KEY (hash) REFERENCES transactions (hash) \
             ON DELETE CASCADE ON UPDATE CASCADE)"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS transaction_paymentids ( \
             hash {hash} NOT NULL, \
             paymentId {hash} NOT NULL, \
             PRIMARY KEY (hash, paymentId), \
             FOREIGN KEY (hash) REFERENCES transactions (hash) \
             ON DELETE CASCADE ON UPDATE CASCADE)"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS transaction_pool ( \
             hash {hash} NOT NULL, \
             fee {big} NOT NULL, \
             size {big} NOT NULL, \
             amount {big} NOT NULL, \
             data {blob} NOT NULL, \
             PRIMARY KEY (hash))"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS information ( \
             idx {key} NOT NULL, \
             data {blob} NOT NULL, \
             PRIMARY KEY (idx))"
        ),
    ];

    for (name, table, columns) in [
        ("idx_blockchain_timestamp", "blockchain", "utctimestamp"),
        ("idx_transactions_block", "transactions", "block_hash"),
        ("idx_outputs_amount", "transaction_outputs", "amount"),
        ("idx_paymentids_id", "transaction_paymentids", "paymentId"),
    ] {
        if let Some(stmt) = backend.create_index(name, table, columns) {
            ddl.push(stmt);
        }
    }

    ddl
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_tables_are_guarded() {
        for backend in [Backend::Sqlite, Backend::MySql, Backend::Postgres] {
            for stmt in statements(backend) {
                assert!(stmt.contains("IF NOT EXISTS"), "unguarded: {}", stmt);
            }
        }
    }

    #[test]
    fn mysql_skips_bare_index_statements() {
        assert!(statements(Backend::MySql)
            .iter()
            .all(|s| s.starts_with("CREATE TABLE")));
    }
}
