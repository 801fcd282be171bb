use chrono::NaiveDate;

pub const REPORT_SUBJECT: &str = "[Daily report] Channel community analysis";

/// The analyses run over each day's transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Analysis {
    FrequentQuestions,
    TrendingTopics,
}

impl Analysis {
    pub const ALL: [Analysis; 2] = [Analysis::FrequentQuestions, Analysis::TrendingTopics];

    pub fn title(self) -> &'static str {
        match self {
            Analysis::FrequentQuestions => "Frequently asked questions (Q&A)",
            Analysis::TrendingTopics => "Trending topics",
        }
    }

    pub fn prompt(self, transcript: &str) -> String {
        let instruction = match self {
            Analysis::FrequentQuestions => {
                "From the following channel conversation, summarize the three most frequent questions and their answers in Q&A form."
            }
            Analysis::TrendingTopics => {
                "From the following channel conversation, list the three topics people are talking about most as bullet points."
            }
        };
        format!("{instruction}\n\n{transcript}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestReport {
    pub date: NaiveDate,
    pub sections: Vec<(Analysis, String)>,
}

impl DigestReport {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            sections: Vec::new(),
        }
    }

    pub fn add_section(&mut self, analysis: Analysis, body: impl Into<String>) {
        self.sections.push((analysis, body.into()));
    }

    pub fn render(&self) -> String {
        let mut out = format!("Channel daily report ({})\n", self.date.format("%Y-%m-%d"));
        for (analysis, body) in &self.sections {
            out.push_str(&format!("\n■ {}\n{}\n", analysis.title(), body.trim_end()));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_dates_the_report_and_keeps_section_order() {
        let mut report = DigestReport::new(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap());
        report.add_section(Analysis::FrequentQuestions, "Q: a\nA: b\n");
        report.add_section(Analysis::TrendingTopics, "- releases");

        let text = report.render();

        assert!(text.starts_with("Channel daily report (2025-01-15)"));
        let qa = text.find("Frequently asked questions").unwrap();
        let topics = text.find("Trending topics").unwrap();
        assert!(qa < topics);
        assert!(text.contains("Q: a\nA: b\n"));
    }

    #[test]
    fn prompts_carry_the_transcript() {
        let prompt = Analysis::TrendingTopics.prompt("hello\nworld");
        assert!(prompt.ends_with("\n\nhello\nworld"));
    }
}
