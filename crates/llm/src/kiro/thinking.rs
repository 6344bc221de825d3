//! Thinking-block extractor: a deterministic FSM that splits
//! `<thinking>...</thinking>`-tagged reasoning out of the visible text
//! stream, character by character.

const OPEN_TAG: &str = "<thinking>";
const CLOSE_TAG: &str = "</thinking>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Outside,
    BufferingOpen,
    InsideThinking,
    BufferingClose,
}

/// One step's output: text to append to each of the two interleaved streams.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Emission {
    pub visible: String,
    pub reasoning: String,
}

impl Emission {
    fn visible(text: impl Into<String>) -> Self {
        Self { visible: text.into(), reasoning: String::new() }
    }

    fn reasoning(text: impl Into<String>) -> Self {
        Self { visible: String::new(), reasoning: text.into() }
    }

    fn merge(&mut self, other: Emission) {
        self.visible.push_str(&other.visible);
        self.reasoning.push_str(&other.reasoning);
    }
}

/// Extracts `<thinking>` blocks from a character stream fed incrementally.
pub struct ThinkingExtractor {
    state: State,
    lookahead: String,
    reasoning_chars_emitted: usize,
    /// Approximate character budget for the reasoning stream (token cap
    /// approximated by characters × factor). 4 chars/token is the
    /// conventional rough English-text ratio used for this kind of budget.
    reasoning_char_budget: usize,
}

const CHARS_PER_TOKEN_APPROX: usize = 4;

impl ThinkingExtractor {
    pub fn new(reasoning_token_budget: u32) -> Self {
        Self {
            state: State::Outside,
            lookahead: String::new(),
            reasoning_chars_emitted: 0,
            reasoning_char_budget: reasoning_token_budget as usize * CHARS_PER_TOKEN_APPROX,
        }
    }

    pub fn is_inside_thinking(&self) -> bool {
        matches!(self.state, State::InsideThinking | State::BufferingClose)
    }

    /// Feed one chunk of text-delta content, returning the visible/reasoning
    /// text produced by consuming it.
    pub fn push(&mut self, text: &str) -> Emission {
        let mut out = Emission::default();
        for ch in text.chars() {
            out.merge(self.push_char(ch));
        }
        out
    }

    fn push_char(&mut self, ch: char) -> Emission {
        match self.state {
            State::Outside => {
                if ch == '<' {
                    self.lookahead.push(ch);
                    self.state = State::BufferingOpen;
                    Emission::default()
                } else {
                    Emission::visible(ch.to_string())
                }
            }
            State::BufferingOpen => {
                self.lookahead.push(ch);
                if self.lookahead == OPEN_TAG {
                    self.lookahead.clear();
                    self.state = State::InsideThinking;
                    self.reasoning_chars_emitted = 0;
                    Emission::default()
                } else if OPEN_TAG.starts_with(&self.lookahead) {
                    Emission::default()
                } else {
                    let flushed = std::mem::take(&mut self.lookahead);
                    self.state = State::Outside;
                    Emission::visible(flushed)
                }
            }
            State::InsideThinking => {
                if ch == '<' {
                    self.lookahead.push(ch);
                    self.state = State::BufferingClose;
                    Emission::default()
                } else {
                    self.emit_reasoning_char(ch)
                }
            }
            State::BufferingClose => {
                self.lookahead.push(ch);
                if self.lookahead == CLOSE_TAG {
                    self.lookahead.clear();
                    self.state = State::Outside;
                    Emission::default()
                } else if CLOSE_TAG.starts_with(&self.lookahead) {
                    Emission::default()
                } else {
                    let flushed = std::mem::take(&mut self.lookahead);
                    self.state = State::InsideThinking;
                    let mut out = Emission::default();
                    for c in flushed.chars() {
                        out.merge(self.emit_reasoning_char(c));
                    }
                    out
                }
            }
        }
    }

    /// Past the reasoning budget, surplus characters are silently
    /// redirected to `visible` instead of `reasoning`.
    fn emit_reasoning_char(&mut self, ch: char) -> Emission {
        if self.reasoning_chars_emitted < self.reasoning_char_budget {
            self.reasoning_chars_emitted += 1;
            Emission::reasoning(ch.to_string())
        } else {
            Emission::visible(ch.to_string())
        }
    }

    /// Call once the upstream text-delta stream has ended. If a thinking
    /// block was left open, it is implicitly closed and any buffered
    /// lookahead is flushed.
    pub fn finish(mut self) -> Emission {
        let mut out = Emission::default();
        match self.state {
            State::BufferingOpen => {
                out.merge(Emission::visible(std::mem::take(&mut self.lookahead)));
            }
            State::InsideThinking | State::BufferingClose => {
                log::warn!("thinking block still open at end of stream, closing implicitly");
                if self.state == State::BufferingClose {
                    let flushed = std::mem::take(&mut self.lookahead);
                    for c in flushed.chars() {
                        out.merge(self.emit_reasoning_char(c));
                    }
                }
            }
            State::Outside => {}
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(input: &str, budget_tokens: u32) -> Emission {
        let mut extractor = ThinkingExtractor::new(budget_tokens);
        let mut out = extractor.push(input);
        out.merge(extractor.finish());
        out
    }

    #[test]
    fn plain_text_with_no_tags_is_all_visible() {
        let out = run("hello world", 4000);
        assert_eq!(out.visible, "hello world");
        assert_eq!(out.reasoning, "");
    }

    #[test]
    fn balanced_thinking_block_is_removed_from_visible() {
        let out = run("before<thinking>secret</thinking>after", 4000);
        assert_eq!(out.visible, "beforeafter");
        assert_eq!(out.reasoning, "secret");
    }

    #[test]
    fn lone_angle_bracket_that_is_not_a_tag_is_flushed_to_visible() {
        let out = run("a < b", 4000);
        assert_eq!(out.visible, "a < b");
    }

    #[test]
    fn unclosed_thinking_block_is_closed_implicitly_at_end_of_stream() {
        let out = run("before<thinking>secret", 4000);
        assert_eq!(out.visible, "before");
        assert_eq!(out.reasoning, "secret");
    }

    #[test]
    fn reasoning_past_budget_spills_into_visible() {
        // budget of 1 token ~= 4 chars
        let out = run("<thinking>abcdefgh</thinking>", 1);
        assert_eq!(out.reasoning, "abcd");
        assert_eq!(out.visible, "efgh");
    }

    #[test]
    fn feeding_the_tag_one_character_at_a_time_still_matches() {
        let mut extractor = ThinkingExtractor::new(4000);
        let mut out = Emission::default();
        for ch in "<thinking>hi</thinking>".chars() {
            out.merge(extractor.push(&ch.to_string()));
        }
        out.merge(extractor.finish());
        assert_eq!(out.reasoning, "hi");
        assert_eq!(out.visible, "");
    }
}
