//! Grid snake simulation.
//!
//! The snake lives entirely on the board: each occupied cell stores its distance
//! from the tail (1 = tail, head holds the maximum). Moving the snake ages every
//! cell by one and stamps the new head, so no segment list is needed and a game can
//! be copied with a single buffer copy.

use serde::{Deserialize, Serialize};

use super::params::{ParamsError, invalid};
use super::rng::RandomStream;

/// Heading of the snake. Turning right is `+1 mod 4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Towards column 0.
    Left,
    /// Towards row 0.
    Up,
    /// Towards the last column.
    Right,
    /// Towards the last row.
    Down,
}

impl Direction {
    const CLOCKWISE: [Direction; 4] = [
        Direction::Left,
        Direction::Up,
        Direction::Right,
        Direction::Down,
    ];

    fn index(self) -> usize {
        self as usize
    }

    /// Direction after a 90° counter-clockwise turn.
    pub fn turned_left(self) -> Self {
        Self::CLOCKWISE[(self.index() + 3) % 4]
    }

    /// Direction after a 90° clockwise turn.
    pub fn turned_right(self) -> Self {
        Self::CLOCKWISE[(self.index() + 1) % 4]
    }
}

/// Relative move chosen by a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Rotate heading counter-clockwise, then move.
    TurnLeft,
    /// Rotate heading clockwise, then move.
    TurnRight,
    /// Keep heading.
    NoTurn,
}

impl Action {
    /// All actions in logit order.
    pub const ALL: [Action; 3] = [Action::TurnLeft, Action::TurnRight, Action::NoTurn];

    /// Applies the action to a heading.
    pub fn apply(self, direction: Direction) -> Direction {
        match self {
            Action::TurnLeft => direction.turned_left(),
            Action::TurnRight => direction.turned_right(),
            Action::NoTurn => direction,
        }
    }
}

/// Whether eating an apple lengthens the snake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnakeGrowth {
    /// Each apple adds one segment permanently.
    Grow,
    /// The snake keeps its initial length; the tail moves on every step.
    Fixed,
}

/// Why a game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The head left the grid.
    Wall,
    /// The head ran into the body.
    Body,
    /// The maximum score was reached.
    BoardFull,
}

/// Result of a single [`Game::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The snake moved onto an empty cell (or its own vacating tail).
    Moved,
    /// The snake ate the apple and a new apple was placed.
    Ate,
    /// The game is over.
    Over(Termination),
}

impl StepOutcome {
    /// `true` for any terminal outcome.
    pub fn is_over(self) -> bool {
        matches!(self, StepOutcome::Over(_))
    }
}

/// Immutable rules shared by a game and every copy of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRules {
    /// Board side length.
    pub size: usize,
    /// Snake length right after reset.
    pub initial_length: usize,
    /// Growth rule.
    pub growth: SnakeGrowth,
}

impl GameRules {
    /// Rules with the default starting length of three and permanent growth.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            initial_length: 3,
            growth: SnakeGrowth::Grow,
        }
    }

    /// Number of cells on the board.
    pub fn cells(&self) -> usize {
        self.size * self.size
    }

    /// Score at which the game ends because the board would be full.
    pub fn max_score(&self) -> u32 {
        (self.cells() - self.initial_length) as u32
    }

    /// Checks that a board of these rules can be built and reset.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.size < 2 {
            return Err(invalid("board_size", "must be at least 2"));
        }
        if self.cells() > usize::from(u8::MAX) {
            return Err(invalid(
                "board_size",
                format!("{} cells do not fit the u8 board encoding", self.cells()),
            ));
        }
        if self.initial_length < 2 || self.initial_length > self.size / 2 + 1 {
            return Err(invalid(
                "initial_length",
                format!("must be between 2 and {} on this board", self.size / 2 + 1),
            ));
        }
        Ok(())
    }
}

/// Read-only snapshot access for renderers and other observers.
pub trait GameView {
    /// Board side length.
    fn size(&self) -> usize;
    /// Row-major cell values.
    fn cells(&self) -> &[u8];
    /// Flat index of the head.
    fn head(&self) -> usize;
    /// Flat index of the apple.
    fn apple(&self) -> usize;
    /// Apples eaten so far.
    fn score(&self) -> u32;
    /// Whether the game has ended.
    fn is_over(&self) -> bool;
}

/// A snake game on a square board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Game {
    rules: GameRules,
    board: Vec<u8>,
    head: usize,
    apple: usize,
    direction: Direction,
    score: u32,
    steps: u32,
    ended: Option<Termination>,
}

impl Game {
    /// Creates a game and resets it, drawing the first apple from `rng`.
    ///
    /// # Panics
    ///
    /// Panics if the rules fail [`GameRules::validate`].
    pub fn new(rules: GameRules, rng: &mut RandomStream) -> Self {
        if let Err(err) = rules.validate() {
            panic!("invalid game rules: {err}");
        }
        let mut game = Self {
            rules,
            board: vec![0; rules.cells()],
            head: 0,
            apple: 0,
            direction: Direction::Right,
            score: 0,
            steps: 0,
            ended: None,
        };
        game.reset(rng);
        game
    }

    /// Clears the board, lays the snake out at the center facing right and places
    /// a new apple.
    pub fn reset(&mut self, rng: &mut RandomStream) {
        let size = self.rules.size;
        let length = self.rules.initial_length;
        self.board.fill(0);
        self.head = (size / 2) * size + size / 2;
        for offset in 0..length {
            self.board[self.head - offset] = (length - offset) as u8;
        }
        self.direction = Direction::Right;
        self.score = 0;
        self.steps = 0;
        self.ended = None;
        self.place_apple(rng);
    }

    /// Builds a game around an explicit snake, listed head first, heading
    /// `direction`.
    ///
    /// The score follows from the length (`len - initial_length`), and `Fixed`
    /// rules only accept snakes of the initial length. A snake covering every
    /// cell ends the game as [`Termination::BoardFull`] with the apple left under
    /// the head. Otherwise an apple is drawn from `rng`.
    pub fn from_snake(
        rules: GameRules,
        snake: &[usize],
        direction: Direction,
        rng: &mut RandomStream,
    ) -> Result<Self, ParamsError> {
        rules.validate()?;
        let cells = rules.cells();
        let fits = match rules.growth {
            SnakeGrowth::Grow => (rules.initial_length..=cells).contains(&snake.len()),
            SnakeGrowth::Fixed => snake.len() == rules.initial_length,
        };
        if !fits {
            return Err(invalid(
                "snake",
                format!("length {} does not fit these rules", snake.len()),
            ));
        }

        let mut game = Self {
            rules,
            board: vec![0; cells],
            head: snake[0],
            apple: snake[0],
            direction,
            score: (snake.len() - rules.initial_length) as u32,
            steps: 0,
            ended: None,
        };
        for (offset, &cell) in snake.iter().enumerate() {
            if cell >= cells || game.board[cell] != 0 {
                return Err(invalid(
                    "snake",
                    format!("cell {cell} is off the board or listed twice"),
                ));
            }
            if offset > 0 && !game.adjacent(snake[offset - 1], cell) {
                return Err(invalid(
                    "snake",
                    format!("cell {cell} does not touch the segment before it"),
                ));
            }
            game.board[cell] = (snake.len() - offset) as u8;
        }

        if game.score >= rules.max_score() {
            game.ended = Some(Termination::BoardFull);
        } else {
            game.place_apple(rng);
        }
        Ok(game)
    }

    /// Moves the apple to a uniformly chosen empty cell.
    ///
    /// # Panics
    ///
    /// Panics when no cell is empty; the max-score terminal keeps normal play from
    /// ever getting there.
    pub fn place_apple(&mut self, rng: &mut RandomStream) {
        assert!(
            self.board.contains(&0),
            "cannot place an apple on a full board"
        );
        let cells = self.board.len();
        let mut candidate = rng.next_int(cells);
        while self.board[candidate] > 0 {
            candidate = rng.next_int(cells);
        }
        self.apple = candidate;
    }

    /// Advances the game by one move.
    pub fn step(&mut self, action: Action, rng: &mut RandomStream) -> StepOutcome {
        if let Some(termination) = self.ended {
            return StepOutcome::Over(termination);
        }
        self.direction = action.apply(self.direction);

        let Some(next) = self.neighbor(self.head, self.direction) else {
            return self.finish(Termination::Wall);
        };
        // The tail (value 1) vacates this turn, so only older segments block.
        if self.board[next] > 1 {
            return self.finish(Termination::Body);
        }

        self.head = next;
        self.steps += 1;

        if next == self.apple {
            self.score += 1;
            if self.score >= self.rules.max_score() {
                return self.finish(Termination::BoardFull);
            }
            if self.rules.growth == SnakeGrowth::Fixed {
                self.age_body();
            }
            self.board[next] = self.length();
            self.place_apple(rng);
            StepOutcome::Ate
        } else {
            self.age_body();
            self.board[next] = self.length();
            StepOutcome::Moved
        }
    }

    /// Copies every mutable field from `other`, reusing this game's buffers.
    ///
    /// # Panics
    ///
    /// Panics if the two games were built with different rules.
    pub fn copy_state(&mut self, other: &Game) {
        assert_eq!(self.rules, other.rules, "copy_state across different rules");
        self.board.copy_from_slice(&other.board);
        self.head = other.head;
        self.apple = other.apple;
        self.direction = other.direction;
        self.score = other.score;
        self.steps = other.steps;
        self.ended = other.ended;
    }

    /// Rules this game was built with.
    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    /// Current heading.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Successful moves since the last reset.
    pub fn steps(&self) -> u32 {
        self.steps
    }

    /// Current snake length.
    pub fn length(&self) -> u8 {
        match self.rules.growth {
            SnakeGrowth::Grow => (self.rules.initial_length as u32 + self.score) as u8,
            SnakeGrowth::Fixed => self.rules.initial_length as u8,
        }
    }

    /// Why the game ended, if it has.
    pub fn termination(&self) -> Option<Termination> {
        self.ended
    }

    fn finish(&mut self, termination: Termination) -> StepOutcome {
        self.ended = Some(termination);
        StepOutcome::Over(termination)
    }

    fn age_body(&mut self) {
        for cell in &mut self.board {
            *cell = cell.saturating_sub(1);
        }
    }

    fn adjacent(&self, a: usize, b: usize) -> bool {
        Direction::CLOCKWISE
            .iter()
            .any(|&direction| self.neighbor(a, direction) == Some(b))
    }

    fn neighbor(&self, index: usize, direction: Direction) -> Option<usize> {
        let size = self.rules.size;
        let (row, col) = (index / size, index % size);
        match direction {
            Direction::Left => (col > 0).then(|| index - 1),
            Direction::Up => (row > 0).then(|| index - size),
            Direction::Right => (col + 1 < size).then(|| index + 1),
            Direction::Down => (row + 1 < size).then(|| index + size),
        }
    }
}

impl GameView for Game {
    fn size(&self) -> usize {
        self.rules.size
    }

    fn cells(&self) -> &[u8] {
        &self.board
    }

    fn head(&self) -> usize {
        self.head
    }

    fn apple(&self) -> usize {
        self.apple
    }

    fn score(&self) -> u32 {
        self.score
    }

    fn is_over(&self) -> bool {
        self.ended.is_some()
    }
}
