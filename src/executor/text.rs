//! Text stage: compose a new devotional message with an LM and save it.
use super::lm::{LmBackend, LmMessage};
use super::TextGenerator;
use crate::config::TextConfig;
use crate::identity::ItemIdentity;
use crate::layout::naming;
use crate::stage::StageKind;
use anyhow::{Context, Result};
use rand::Rng;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const SERMON_SYSTEM: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/sermon_system.md"
));
const SERMON: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/sermon.md"));
const CONTINUATION_SYSTEM: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/continuation_system.md"
));
const CONTINUATION: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/continuation.md"
));

/// Words of the current draft quoted back in a continuation request.
const CONTINUATION_TAIL_WORDS: usize = 30;

/// A sermon topic with the points and passages it should cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topic {
    pub title: &'static str,
    pub main_points: [&'static str; 4],
    pub key_scriptures: [&'static str; 4],
}

pub const TOPICS: &[Topic] = &[
    Topic {
        title: "God's Love",
        main_points: [
            "Unconditional Nature of God's Love",
            "Demonstrating God's Love Through Christ",
            "Experiencing God's Love Daily",
            "Sharing God's Love with Others",
        ],
        key_scriptures: ["John 3:16", "1 John 4:7-8", "Romans 5:8", "Ephesians 3:17-19"],
    },
    Topic {
        title: "Faith and Trust",
        main_points: [
            "Understanding Biblical Faith",
            "Building Trust in God",
            "Faith in Difficult Times",
            "Growing Your Faith Daily",
        ],
        key_scriptures: ["Hebrews 11:1", "Proverbs 3:5-6", "James 1:2-4", "Romans 10:17"],
    },
    Topic {
        title: "Prayer",
        main_points: [
            "The Power of Prayer",
            "Different Types of Prayer",
            "Developing a Prayer Life",
            "Praying with Purpose",
        ],
        key_scriptures: [
            "Philippians 4:6-7",
            "1 Thessalonians 5:17",
            "James 5:16",
            "Matthew 6:9-13",
        ],
    },
    Topic {
        title: "Grace and Salvation",
        main_points: [
            "Understanding God's Grace",
            "The Gift of Salvation",
            "Living in Grace Daily",
            "Sharing the Message of Grace",
        ],
        key_scriptures: [
            "Ephesians 2:8-9",
            "Romans 6:23",
            "Titus 2:11-12",
            "2 Corinthians 12:9",
        ],
    },
    Topic {
        title: "Spiritual Growth",
        main_points: [
            "The Process of Sanctification",
            "Developing Spiritual Disciplines",
            "Overcoming Spiritual Obstacles",
            "Bearing Spiritual Fruit",
        ],
        key_scriptures: [
            "2 Peter 3:18",
            "Philippians 1:6",
            "Galatians 5:22-23",
            "Colossians 1:9-10",
        ],
    },
    Topic {
        title: "Biblical Community",
        main_points: [
            "The Importance of Fellowship",
            "Building Strong Relationships",
            "Serving One Another",
            "Unity in Christ",
        ],
        key_scriptures: [
            "Hebrews 10:24-25",
            "Acts 2:42-47",
            "1 Corinthians 12:12-27",
            "Ephesians 4:11-16",
        ],
    },
    Topic {
        title: "Overcoming Trials",
        main_points: [
            "Understanding God's Purpose in Trials",
            "Finding Strength in Adversity",
            "The Role of Community in Trials",
            "Victory Through Christ",
        ],
        key_scriptures: [
            "James 1:2-4",
            "Romans 8:28",
            "2 Corinthians 4:16-18",
            "1 Peter 5:10",
        ],
    },
    Topic {
        title: "Biblical Worship",
        main_points: [
            "Understanding True Worship",
            "Worship in Spirit and Truth",
            "Living a Life of Worship",
            "Corporate Worship",
        ],
        key_scriptures: ["John 4:23-24", "Psalm 95:1-6", "Romans 12:1", "Hebrews 13:15-16"],
    },
    Topic {
        title: "Spiritual Warfare",
        main_points: [
            "Understanding the Battle",
            "The Armor of God",
            "Strategies for Victory",
            "Standing Firm in Faith",
        ],
        key_scriptures: [
            "Ephesians 6:10-18",
            "2 Corinthians 10:3-5",
            "1 Peter 5:8-9",
            "James 4:7",
        ],
    },
    Topic {
        title: "Biblical Stewardship",
        main_points: [
            "Managing God's Resources",
            "Time and Talent Stewardship",
            "Financial Stewardship",
            "Environmental Stewardship",
        ],
        key_scriptures: ["Matthew 25:14-30", "1 Peter 4:10", "Malachi 3:10", "Genesis 1:28"],
    },
    Topic {
        title: "The Holy Spirit",
        main_points: [
            "Understanding the Holy Spirit",
            "The Gifts of the Spirit",
            "Walking in the Spirit",
            "The Fruit of the Spirit",
        ],
        key_scriptures: [
            "John 14:26",
            "Acts 1:8",
            "Galatians 5:22-23",
            "1 Corinthians 12:4-11",
        ],
    },
    Topic {
        title: "Biblical Leadership",
        main_points: [
            "Servant Leadership",
            "Developing Godly Character",
            "Leading by Example",
            "Empowering Others",
        ],
        key_scriptures: ["Mark 10:42-45", "1 Timothy 3:1-7", "Titus 1:5-9", "1 Peter 5:1-4"],
    },
];

/// Pick a topic uniformly at random.
pub fn pick_topic<R: Rng + ?Sized>(rng: &mut R) -> &'static Topic {
    &TOPICS[rng.gen_range(0..TOPICS.len())]
}

pub struct LmTextGenerator {
    backend: LmBackend,
    settings: TextConfig,
}

impl LmTextGenerator {
    pub fn new(backend: LmBackend, settings: TextConfig) -> Self {
        Self { backend, settings }
    }

    /// Draft a message for `topic`, extending it while it is shorter than
    /// `min_words` and continuations remain.
    pub fn compose(&self, topic: &Topic) -> Result<String> {
        let mut content = self.backend.complete(&[
            LmMessage::system(SERMON_SYSTEM.trim()),
            LmMessage::user(self.sermon_prompt(topic)),
        ])?;
        let mut words = word_count(&content);
        let min_words = self.settings.min_words as usize;
        let mut continuations = 0;

        while words < min_words && continuations < self.settings.max_continuations {
            continuations += 1;
            let remaining = (self.settings.target_words as usize).saturating_sub(words);
            let addition = self.backend.complete(&[
                LmMessage::system(CONTINUATION_SYSTEM.trim()),
                LmMessage::user(continuation_prompt(&content, remaining)),
            ])?;
            if addition.trim().is_empty() {
                break;
            }
            content.push_str("\n\n");
            content.push_str(addition.trim());
            words = word_count(&content);
            tracing::info!(topic = topic.title, words, continuations, "text extended");
        }

        if words < min_words || words > self.settings.max_words as usize {
            tracing::warn!(
                topic = topic.title,
                words,
                min_words = self.settings.min_words,
                max_words = self.settings.max_words,
                "text length outside target range"
            );
        }
        Ok(content)
    }

    fn sermon_prompt(&self, topic: &Topic) -> String {
        let main_points = topic
            .main_points
            .iter()
            .map(|point| format!("   - {point}"))
            .collect::<Vec<_>>()
            .join("\n");
        let scriptures = topic
            .key_scriptures
            .iter()
            .map(|passage| format!("- {passage}"))
            .collect::<Vec<_>>()
            .join("\n");
        SERMON
            .replace("{target_words}", &self.settings.target_words.to_string())
            .replace("{topic}", topic.title)
            .replace("{main_points}", &main_points)
            .replace("{scriptures}", &scriptures)
    }
}

fn continuation_prompt(content: &str, remaining: usize) -> String {
    let words: Vec<&str> = content.split_whitespace().collect();
    let tail = words[words.len().saturating_sub(CONTINUATION_TAIL_WORDS)..].join(" ");
    CONTINUATION
        .replace("{remaining_words}", &remaining.to_string())
        .replace("{tail}", &tail)
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

impl TextGenerator for LmTextGenerator {
    fn generate(&self, text_dir: &Path) -> Result<PathBuf> {
        let topic = pick_topic(&mut rand::thread_rng());
        tracing::info!(topic = topic.title, backend = %self.backend.describe(), "generating text");
        let content = self.compose(topic)?;
        let identity = ItemIdentity::new_for_topic(chrono::Local::now().naive_local(), topic.title);
        write_new_text(text_dir, &identity, &content)
    }
}

/// Write a text artifact, refusing to overwrite an existing one.
pub fn write_new_text(text_dir: &Path, identity: &ItemIdentity, content: &str) -> Result<PathBuf> {
    fs::create_dir_all(text_dir).with_context(|| format!("create {}", text_dir.display()))?;
    let path = text_dir.join(naming(StageKind::TextGenerated).file_name(identity));
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .with_context(|| format!("create {}", path.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}
