//! Multi-process scan tests.
//!
//! These tests require MPI and the `distributed` feature flag.
//! Run with: mpirun -n 3 cargo test --features distributed --test distributed_test
//!
//! Without MPI installed, these tests are excluded from the default build.

#![cfg(feature = "distributed")]

use hyperscan::comm::CommunicationBackend;
use hyperscan::comm_mpi::MpiComm;
use hyperscan::config::ScanConfig;
use hyperscan::data;
use hyperscan::driver;
use hyperscan::verify::Oracle;

#[test]
fn distributed_scan_matches_oracle() {
    let _universe = mpi::initialize().expect("MPI init failed");
    let comm = MpiComm::new();

    let config = ScanConfig::with_len(1 << 12);
    let data = data::generate(config.len, config.seed, config.max_value)
        .expect("data generation failed");
    let oracle = Oracle::new(&data);
    let source = (comm.rank() == config.root).then_some(&data[..]);

    let report = driver::run_rank(&comm, &config, source, Some(&oracle)).expect("scan failed");

    assert_eq!(report.sum, oracle.total());
    let end = report.offset + report.count;
    let expected_prefix: i64 = data[..end].iter().sum();
    assert_eq!(report.prefix_sum, Some(expected_prefix));
    if let Some(verification) = report.verification {
        assert!(verification.is_match());
    }
}
