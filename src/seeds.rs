//! Built-in content so the app is useful without a catalog file.

use crate::domain::{
  Course, Difficulty, OnchainGate, PassThreshold, Question, Quiz, ScoringMode, TheorySection, TimerMode,
};

fn q(id: &str, prompt: &str, options: &[&str], correct: usize, explanation: &str, points: u32) -> Question {
  Question {
    id: id.into(),
    prompt: prompt.into(),
    options: options.iter().map(|s| s.to_string()).collect(),
    correct,
    explanation: explanation.into(),
    points,
    time_limit_secs: None,
  }
}

fn section(heading: &str, body: &str) -> TheorySection {
  TheorySection { heading: heading.into(), body: body.into() }
}

pub fn seed_quizzes() -> Vec<Quiz> {
  vec![
    Quiz {
      id: "blockchain-fundamentals".into(),
      title: "Blockchain Fundamentals".into(),
      description: "Master the basic concepts of blockchain technology".into(),
      category: "Blockchain".into(),
      difficulty: Difficulty::Beginner,
      questions: vec![
        q("bf-1", "What is a blockchain?",
          &["A centralized database", "A distributed ledger technology", "A cryptocurrency", "A mining algorithm"],
          1, "A blockchain is a distributed ledger of blocks linked and secured with cryptography.", 25),
        q("bf-2", "Which consensus mechanism does Bitcoin use?",
          &["Proof of Stake", "Proof of Work", "Delegated Proof of Stake", "Proof of Authority"],
          1, "Bitcoin miners compete to solve puzzles under Proof of Work.", 25),
        q("bf-3", "What is immutability in blockchain?",
          &["The ability to change any transaction", "The inability to alter recorded data", "A consensus algorithm", "A type of cryptocurrency"],
          1, "Recorded data cannot be changed or deleted once it is on chain.", 25),
        q("bf-4", "What is a smart contract?",
          &["A legal document", "Self-executing code on blockchain", "A trading algorithm", "A wallet application"],
          1, "Smart contracts are programs stored and executed by the network.", 25),
      ],
      timer: TimerMode::WholeQuiz { secs: 15 * 60 },
      pass: PassThreshold::Percent(80),
      scoring: ScoringMode::Points,
      xp_reward: 50,
      onchain: OnchainGate::PerfectOnly,
      allow_back: false,
      show_explanations: false,
    },
    Quiz {
      id: "crypto-basics".into(),
      title: "Cryptocurrency Basics".into(),
      description: "Essential knowledge about digital currencies and wallets".into(),
      category: "Cryptocurrency".into(),
      difficulty: Difficulty::Beginner,
      questions: vec![
        q("cb-1", "What is cryptocurrency?",
          &["Physical coins", "Digital or virtual currency secured by cryptography", "Bank notes", "Credit cards"],
          1, "Cryptography makes digital currency hard to counterfeit or double-spend.", 25),
        q("cb-2", "What is a private key?",
          &["A public address", "A secret code that controls cryptocurrency", "A wallet name", "A transaction ID"],
          1, "Whoever holds the private key controls the funds. Never share it.", 25),
        q("cb-3", "What does 'HODL' mean in cryptocurrency?",
          &["Hold On for Dear Life", "High Order Digital Ledger", "Hash Output Data Link", "Hybrid Online Digital Logic"],
          0, "A misspelled 'hold' that became slang for holding long-term.", 25),
      ],
      timer: TimerMode::WholeQuiz { secs: 12 * 60 },
      pass: PassThreshold::Percent(80),
      scoring: ScoringMode::Points,
      xp_reward: 40,
      onchain: OnchainGate::PerfectOnly,
      allow_back: false,
      show_explanations: false,
    },
    Quiz {
      id: "aptos-ecosystem".into(),
      title: "Aptos Ecosystem".into(),
      description: "Deep dive into Aptos blockchain and Move programming".into(),
      category: "Aptos".into(),
      difficulty: Difficulty::Intermediate,
      questions: vec![
        q("ae-1", "What programming language is used for Aptos smart contracts?",
          &["Solidity", "Move", "Rust", "JavaScript"],
          1, "Move is a resource-oriented language adopted by Aptos.", 30),
        q("ae-2", "What consensus mechanism does Aptos use?",
          &["Proof of Work", "Proof of Stake", "AptosBFT", "Delegated Proof of Stake"],
          2, "AptosBFT is a Byzantine fault tolerant protocol with low latency.", 30),
        q("ae-3", "What is the native token of Aptos?",
          &["ETH", "APT", "MOVE", "BTC"],
          1, "APT pays for fees, staking and governance.", 30),
        q("ae-4", "What is a key feature of Move language?",
          &["Resource safety", "High gas fees", "Slow execution", "Limited functionality"],
          0, "Resources cannot be duplicated or silently dropped.", 30),
        q("ae-5", "What is Aptos' approach to parallel execution?",
          &["Sequential only", "Block STM", "Single threaded", "No parallelization"],
          1, "Block-STM executes transactions optimistically in parallel.", 30),
      ],
      timer: TimerMode::PerQuestion { default_secs: 60 },
      pass: PassThreshold::Correct(4),
      scoring: ScoringMode::Count,
      xp_reward: 75,
      onchain: OnchainGate::PerfectOnly,
      allow_back: true,
      show_explanations: true,
    },
  ]
}

pub fn seed_courses() -> Vec<Course> {
  vec![
    Course {
      id: "blockchain-101".into(),
      title: "Blockchain 101".into(),
      description: "How distributed ledgers work and why they matter".into(),
      category: "Blockchain".into(),
      difficulty: Difficulty::Beginner,
      theory: vec![
        section("Ledgers", "A blockchain is an append-only ledger replicated across many nodes."),
        section("Consensus", "Nodes agree on the next block through a consensus protocol such as Proof of Work."),
        section("Smart contracts", "Programs deployed on chain run exactly as written when called."),
      ],
      quiz_ids: vec!["blockchain-fundamentals".into()],
    },
    Course {
      id: "crypto-101".into(),
      title: "Cryptocurrency Essentials".into(),
      description: "Wallets, keys and digital money".into(),
      category: "Cryptocurrency".into(),
      difficulty: Difficulty::Beginner,
      theory: vec![
        section("Keys", "A private key signs transactions; the public address receives funds."),
        section("Wallets", "Wallets keep keys and ask you to approve every transaction."),
      ],
      quiz_ids: vec!["crypto-basics".into()],
    },
    Course {
      id: "aptos-move".into(),
      title: "Aptos and Move".into(),
      description: "The Aptos network and its Move language".into(),
      category: "Aptos".into(),
      difficulty: Difficulty::Intermediate,
      theory: vec![
        section("Move", "Move models assets as resources that can only be moved, never copied."),
        section("Execution", "Block-STM runs transactions in parallel and re-executes on conflicts."),
      ],
      quiz_ids: vec!["aptos-ecosystem".into()],
    },
  ]
}
