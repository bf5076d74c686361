use batch_mcts::{test_utils::UniformInference, utils, CombinatorialLock, MctsBatch, MctsBatchConfig, MctsError, Simulator};

const ITERATIONS: usize = 10_000;

#[test]
fn test_uniform_search_opens_the_lock() -> Result<(), MctsError> {
    let combination = vec![3, 1, 2, 4, 0];
    let batch_size = 5;

    let mut lock = CombinatorialLock::new(5, combination.clone())?;
    let reset = lock.reset(batch_size)?;
    let config = MctsBatchConfig::for_evaluation().with_iterations(ITERATIONS);
    let mut mcts = MctsBatch::new(reset.states, reset.masks, UniformInference::new(5), lock, config)?;

    for (j, &digit) in combination.iter().enumerate() {
        mcts.run()?;

        let counts = mcts.current_visit_counts();
        let mut actions = Vec::new();
        for row in counts.outer_iter() {
            assert!(row.sum() as usize >= ITERATIONS);

            let row: Vec<f32> = row.iter().map(|&n| n as f32).collect();
            actions.push(utils::argmax(&row));
        }
        assert!(actions.iter().all(|&action| action == digit), "step {j}: picked {actions:?}");

        mcts.step(&actions)?;

        if j + 1 < combination.len() {
            assert!(mcts.current_visit_counts().outer_iter().all(|row| row.sum() > 0));
        }
    }

    assert!(mcts.all_terminals());

    let episodes = mcts.get_episodes()?;
    for sequence in 0..batch_size {
        assert_eq!(episodes.lengths[sequence], combination.len());
        assert_eq!(episodes.actions.row(sequence).to_vec(), combination);
        assert!((episodes.rewards.row(sequence).sum() - 1.0).abs() < 1e-6);
    }
    Ok(())
}

#[test]
fn test_intermediate_rewards_guide_short_searches() -> Result<(), MctsError> {
    let combination = vec![2, 0, 1];

    let mut lock = CombinatorialLock::new(3, combination.clone())?.with_intermediate_rewards(true);
    let reset = lock.reset(2)?;
    let config = MctsBatchConfig::for_evaluation().with_iterations(200);
    let mut mcts = MctsBatch::new(reset.states, reset.masks, UniformInference::new(3), lock, config)?;

    while !mcts.all_terminals() {
        mcts.run()?;
        let actions: Vec<usize> = mcts
            .current_visit_counts()
            .outer_iter()
            .map(|row| {
                let row: Vec<f32> = row.iter().map(|&n| n as f32).collect();
                utils::argmax(&row)
            })
            .collect();
        mcts.step(&actions)?;
    }

    let episodes = mcts.get_episodes()?;
    let returns = episodes.discounted_returns(1.0);
    for sequence in 0..2 {
        assert_eq!(episodes.actions.row(sequence).to_vec(), combination);
        assert!((returns[[sequence, 0]] - 1.0).abs() < 1e-5);
    }
    Ok(())
}
