//! Results output formatting (report text and CSV).

use std::io::Write;

use crate::driver::RankReport;
use crate::error::Result;
use crate::stats::{ExchangeStats, GroupStats};
use crate::verify::Verification;

/// Write the reporter rank's verification.
///
/// Format:
/// ```text
/// Actual number of processors: 3
/// Assumed number of processors: 4
/// Calculated Sum: 36
/// Correct Sum: 36
/// Prefix Sum of Rank 0: 3
/// Verification: PASSED
/// ```
pub fn write_report<W: Write>(verification: &Verification, writer: &mut W) -> Result<()> {
    writeln!(writer, "Actual number of processors: {}", verification.actual_ranks)?;
    writeln!(writer, "Assumed number of processors: {}", verification.padded_ranks)?;
    writeln!(writer, "Calculated Sum: {}", verification.calculated_sum)?;
    writeln!(writer, "Correct Sum: {}", verification.correct_sum)?;
    if let Some((calculated, correct)) = verification.prefix {
        write!(writer, "Prefix Sum of Rank {}: {}", verification.rank, calculated)?;
        if calculated != correct {
            write!(writer, " (expected {correct})")?;
        }
        writeln!(writer)?;
    }
    if verification.is_match() {
        writeln!(writer, "Verification: PASSED")?;
    } else {
        writeln!(writer, "Verification: FAILED")?;
    }
    Ok(())
}

/// Write one CSV row per rank.
///
/// Format:
/// ```csv
/// rank,count,offset,local_sum,sum,prefix_sum
/// 0,2,0,3,36,3
/// 1,2,2,7,36,10
/// ```
/// `prefix_sum` is left empty in reduce-only runs.
pub fn write_ranks_csv<W: Write>(reports: &[RankReport], writer: &mut W) -> Result<()> {
    writeln!(writer, "rank,count,offset,local_sum,sum,prefix_sum")?;
    for r in reports {
        write!(writer, "{},{},{},{},{},", r.rank, r.count, r.offset, r.local_sum, r.sum)?;
        if let Some(prefix) = r.prefix_sum {
            write!(writer, "{prefix}")?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

/// Write the exchange counters table.
pub fn write_stats<W: Write>(stats: &[ExchangeStats], writer: &mut W) -> Result<()> {
    writeln!(writer)?;
    writeln!(writer, "=== Hypercube Exchange Stats ===")?;
    writeln!(
        writer,
        "  {:>4} {:>6} {:>9} {:>5} {:>9} {:>9} {:>8}",
        "rank", "rounds", "exchanges", "skips", "bf_sent", "bf_recv", "barriers"
    )?;
    for s in stats {
        writeln!(
            writer,
            "  {:>4} {:>6} {:>9} {:>5} {:>9} {:>9} {:>8}",
            s.rank,
            s.rounds,
            s.exchanges,
            s.skips,
            s.backfills_sent,
            s.backfills_received,
            s.barriers
        )?;
    }
    let total = GroupStats::collect(stats);
    writeln!(writer, "  ─────────────────────────────────")?;
    writeln!(writer, "  Ranks:                  {}", total.ranks)?;
    writeln!(writer, "  Rounds:                 {}", total.rounds)?;
    writeln!(writer, "  Exchanges:              {}", total.exchanges)?;
    writeln!(writer, "  Skip events:            {}", total.skips)?;
    writeln!(writer, "  Backfills:              {}", total.backfills)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verification(calculated_sum: i64) -> Verification {
        Verification {
            rank: 0,
            actual_ranks: 3,
            padded_ranks: 4,
            calculated_sum,
            correct_sum: 36,
            prefix: Some((3, 3)),
            elements_match: Some(true),
        }
    }

    #[test]
    fn report_lines() {
        let mut out = Vec::new();
        write_report(&verification(36), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "Actual number of processors: 3\n\
             Assumed number of processors: 4\n\
             Calculated Sum: 36\n\
             Correct Sum: 36\n\
             Prefix Sum of Rank 0: 3\n\
             Verification: PASSED\n"
        );
    }

    #[test]
    fn report_surfaces_mismatch() {
        let mut out = Vec::new();
        write_report(&verification(10), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Calculated Sum: 10"));
        assert!(text.ends_with("Verification: FAILED\n"));
    }

    #[test]
    fn stats_table_lists_every_rank() {
        let stats = vec![ExchangeStats::new(0), ExchangeStats::new(1)];
        let mut out = Vec::new();
        write_stats(&stats, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Ranks:                  2"));
    }
}
