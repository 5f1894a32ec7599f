mod common;

use common::*;
use pi_engine::domain::amount::Amount;
use pi_engine::domain::payment_initiation::AdjustmentStatus;
use pi_engine::error::PluginError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const TOTAL: i64 = 10_000;

#[tokio::test]
async fn test_random_reversals_never_exceed_the_initiation_amount() {
    let mut rng = StdRng::seed_from_u64(42);
    let h = harness().await;
    let create = h.seed_transfer("pi_1", TOTAL).await;
    h.engine.create_transfer(create.clone()).await.unwrap();
    let pi = create.payment_initiation_id;

    let mut remaining = TOTAL;
    for i in 0..40 {
        let requested = rng.gen_range(1..=TOTAL / 4);
        let accepted = requested <= remaining;
        // Only reversals that pass validation reach the PSP.
        let psp_fails = accepted && rng.gen_bool(0.25);
        if psp_fails {
            h.plugin
                .on_reverse(Script::Fail(PluginError::Rejected("refund declined".into())))
                .await;
        }

        let reverse = h.seed_reversal(&format!("rev_{i}"), &pi, requested).await;
        let result = h.engine.reverse_transfer(reverse).await;

        match (accepted, psp_fails) {
            (false, _) => {
                let err = result.unwrap_err();
                assert_eq!(
                    err.rejection().map(|r| r.code()),
                    Some("CANNOT_REVERSE_MORE_THAN_AMOUNT"),
                    "reversal {i}"
                );
            }
            (true, true) => {
                let err = result.unwrap_err();
                assert!(err.rejection().is_none(), "reversal {i}");
            }
            (true, false) => {
                result.unwrap();
                remaining -= requested;
            }
        }

        let reversed = h.reversed_total(&pi).await;
        assert_eq!(reversed, Amount::from(TOTAL - remaining), "after reversal {i}");
        assert!(reversed.value() <= Amount::from(TOTAL).value());
    }

    let statuses = h.statuses(&pi).await;
    assert_eq!(statuses[..2], [AdjustmentStatus::Processing, AdjustmentStatus::Processed]);
    assert!(
        !statuses[2..]
            .iter()
            .any(|s| matches!(s, AdjustmentStatus::Processing | AdjustmentStatus::Processed))
    );
    assert_ne!(statuses.last(), Some(&AdjustmentStatus::ReverseProcessing));
}
