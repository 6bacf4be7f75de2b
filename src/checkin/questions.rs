/// The fixed daily question set, asked in order.
pub const DEFAULT_QUESTIONS: &[&str] = &[
    "How are you feeling today?",
    "How would you rate your overall mood today on a scale of 1-10?",
    "Have you had any thoughts of self-harm or suicide?",
    "Have you been taking your medicine on time?",
];

pub const COMPLETION_ACK: &str =
    "Thank you for completing your check-in today! Your responses have been recorded.";

pub const ALREADY_COMPLETED: &str =
    "You've already completed today's check-in. See you tomorrow!";

pub const TRY_AGAIN: &str =
    "Sorry, something went wrong while saving your answer. Please try again in a moment.";

pub const HELP_REQUESTED: &str =
    "Your request has been sent. A member of your care team will contact you soon.";

pub const HELP_UNAVAILABLE: &str =
    "We couldn't reach a clinician for you yet. If you are in danger, please contact your local emergency number.";

#[derive(Debug, Clone)]
pub struct QuestionBank {
    questions: Vec<String>,
}

impl QuestionBank {
    pub fn new(questions: Vec<String>) -> Self {
        Self { questions }
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.questions.get(index).map(String::as_str)
    }

    /// First prompt of the day: greeting plus the first question.
    pub fn opening_prompt(&self, first_name: &str) -> String {
        let first = self.get(0).unwrap_or_default();
        format!("👋 Hey, {first_name}! It's time for your daily check-in. {first}")
    }

    /// Prompt after re-opening a completed day.
    pub fn amendment_prompt(&self, first_name: &str) -> String {
        let first = self.get(0).unwrap_or_default();
        format!("Let's update today's check-in, {first_name}. {first}")
    }

    pub fn not_yet_open(&self, chat_time: &str) -> String {
        format!("Your check-in opens at {chat_time}. I'll message you then!")
    }
}

impl Default for QuestionBank {
    fn default() -> Self {
        Self::new(DEFAULT_QUESTIONS.iter().map(|q| q.to_string()).collect())
    }
}
