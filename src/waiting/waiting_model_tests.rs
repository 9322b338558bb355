/*
 * Unit tests for the waiting model
 *
 * The unit tests follows the Arrange, Act, Assert pattern.
 */

/***************************************/
/*             Unit tests              */
/***************************************/
#[cfg(test)]
mod waiting_model_tests {
    use crate::shared::{Direction, Passenger};
    use crate::waiting::WaitingModel;

    #[test]
    fn test_submit_and_count() {
        // Arrange
        let model = WaitingModel::new(10);

        // Act
        assert!(model.submit(Passenger::new(1, 3, 8)));
        assert!(model.submit(Passenger::new(2, 3, 9)));
        assert!(model.submit(Passenger::new(3, 3, 1)));

        // Assert
        assert_eq!(model.count(3, Direction::Up), 2);
        assert_eq!(model.count(3, Direction::Down), 1);
        assert!(model.has_waiting(3, Direction::Up));
        assert!(!model.has_waiting(4, Direction::Up));
        assert_eq!(model.total_waiting(), 3);
    }

    #[test]
    fn test_board_is_fifo_and_bounded() {
        // Arrange
        let model = WaitingModel::new(10);
        for id in 1..=5 {
            model.submit(Passenger::new(id, 2, 7));
        }

        // Act
        let first = model.board(2, Direction::Up, 3);
        let rest = model.board(2, Direction::Up, 10);

        // Assert
        assert_eq!(
            first.iter().map(|p| p.id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(rest.iter().map(|p| p.id).collect::<Vec<_>>(), vec![4, 5]);
        assert_eq!(model.count(2, Direction::Up), 0);
        assert!(model.board(2, Direction::Up, 1).is_empty());
    }

    #[test]
    fn test_out_of_range_is_neutral() {
        // Arrange
        let model = WaitingModel::new(5);

        // Act / Assert: floor 0 and floor 6 do not exist, Idle is invalid
        assert!(!model.submit(Passenger::new(1, 0, 3)));
        assert!(!model.submit(Passenger::new(2, 6, 3)));
        assert!(!model.submit(Passenger::new(3, 4, 4)));

        assert_eq!(model.count(0, Direction::Up), 0);
        assert_eq!(model.count(6, Direction::Down), 0);
        assert_eq!(model.count(3, Direction::Idle), 0);
        assert!(model.board(0, Direction::Up, 4).is_empty());
        assert!(model.peek(6, Direction::Up, 4).is_empty());
        assert_eq!(model.total_waiting(), 0);
    }

    #[test]
    fn test_peek_does_not_consume() {
        // Arrange
        let model = WaitingModel::new(10);
        model.submit(Passenger::new(1, 5, 9));
        model.submit(Passenger::new(2, 5, 10));

        // Act
        let peeked = model.peek(5, Direction::Up, 1);

        // Assert
        assert_eq!(peeked.len(), 1);
        assert_eq!(peeked[0].id, 1);
        assert_eq!(model.count(5, Direction::Up), 2);
    }

    #[test]
    fn test_directions_are_independent() {
        // Arrange
        let model = WaitingModel::new(10);
        model.submit(Passenger::new(1, 5, 9));
        model.submit(Passenger::new(2, 5, 2));

        // Act
        let up = model.board(5, Direction::Up, 10);

        // Assert
        assert_eq!(up.len(), 1);
        assert_eq!(model.count(5, Direction::Down), 1);
    }
}
