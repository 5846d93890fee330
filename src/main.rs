use ibns2::solver::cases::SimulationCase;

fn main() {
    env_logger::init();

    let cases = [SimulationCase::CouetteX, SimulationCase::Mms { cycles: 5 }];
    for case in cases {
        match case.run() {
            Ok(outcome) => log::info!("{case:?} finished: {outcome:?}"),
            Err(e) => {
                log::error!("{case:?} failed: {e}");
                std::process::exit(1);
            }
        }
    }
}
